use crate::parameter::Parameters;

/// Combines the parameters of a destination with the parameters a middleware adds.
///
/// # Panics
///
/// Panics if a key is declared by both maps.
pub fn merge_parameters(base: Parameters, additions: Parameters) -> Parameters {
    let mut parameters = Parameters::with_capacity(base.len() + additions.len());
    parameters.extend(base);

    for (name, parameter) in additions {
        if parameters.contains_key(&name) {
            panic!("parameter {name:?} declared twice");
        }
        parameters.insert(name, parameter);
    }

    parameters
}
