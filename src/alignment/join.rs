use crate::types::TextUnit;

/// Concatenates consecutive units with the joiner of their script: a single
/// space for space-delimited scripts, nothing for logographic ones.
pub fn join_units(units: &[TextUnit]) -> String {
    match units {
        [] => String::new(),
        [only] => only.text.clone(),
        [first, ..] => {
            let joiner = first.language.script().joiner();
            units
                .iter()
                .map(|u| u.text.as_str())
                .collect::<Vec<_>>()
                .join(joiner)
        }
    }
}
