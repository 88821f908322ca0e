use thiserror::Error;

pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid model name '{0}'. Expected 'name' or 'name@tag' (e.g., 'demo@v1').")]
    InvalidModelName(String),

    #[error("Component '{component}' cannot be empty in logical name '{name}'.")]
    EmptyComponent {
        component: &'static str,
        name: String,
    },

    #[error("Invalid --set format: '{0}'. Expected KEY=VALUE.")]
    InvalidAssignment(String),
}

/// A model in the local model directory, addressed as `name[@tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    pub name: String,
    pub tag: String,
}

pub fn parse_model_name(input: &str) -> Result<ModelName, ParseError> {
    let (name, tag) = match input.split_once('@') {
        Some((name, tag)) => (name, tag),
        None => (input, DEFAULT_TAG),
    };
    if name.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "name",
            name: input.to_string(),
        });
    }
    if tag.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "tag",
            name: input.to_string(),
        });
    }
    let valid = |s: &str| {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(name) || !valid(tag) {
        return Err(ParseError::InvalidModelName(input.to_string()));
    }
    Ok(ModelName {
        name: name.to_string(),
        tag: tag.to_string(),
    })
}

/// Splits `section.key=value` into its key and value.
pub fn parse_assignment(input: &str) -> Result<(&str, &str), ParseError> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => Err(ParseError::InvalidAssignment(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_uses_the_default_tag() {
        assert_eq!(
            parse_model_name("demo").unwrap(),
            ModelName {
                name: "demo".to_string(),
                tag: DEFAULT_TAG.to_string()
            }
        );
    }

    #[test]
    fn tagged_name_is_split() {
        let parsed = parse_model_name("water-eq@v2.1").unwrap();
        assert_eq!(parsed.name, "water-eq");
        assert_eq!(parsed.tag, "v2.1");
    }

    #[test]
    fn empty_components_are_rejected() {
        assert!(matches!(
            parse_model_name("@v1"),
            Err(ParseError::EmptyComponent { component: "name", .. })
        ));
        assert!(matches!(
            parse_model_name("demo@"),
            Err(ParseError::EmptyComponent { component: "tag", .. })
        ));
    }

    #[test]
    fn path_like_names_are_rejected() {
        assert_eq!(
            parse_model_name("../demo"),
            Err(ParseError::InvalidModelName("../demo".to_string()))
        );
    }

    #[test]
    fn assignments_split_on_the_first_equals_sign() {
        assert_eq!(
            parse_assignment("sampler.seed = 42").unwrap(),
            ("sampler.seed", "42")
        );
        assert_eq!(parse_assignment("a=b=c").unwrap(), ("a", "b=c"));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=3").is_err());
    }
}
