//! Construction-time name validators
//!
//! Each check fails with its own [`Rule`] so callers and tests can tell the
//! violations apart. Values that are still deferred expressions are never
//! validated: their content is unknown until deploy time.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Rule, SynthResult, ValidationError};
use crate::expr::Expr;

// =============================================================================
// PATTERNS
// =============================================================================

pub const CUSTOM_TYPE_PREFIX: &str = "Custom::";

pub const MAX_CUSTOM_TYPE_LEN: usize = 60;

/// Characters allowed after the `Custom::` prefix
static CUSTOM_TYPE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_@-]+$").unwrap());

static EVENT_BUS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[/\.\-_A-Za-z0-9]{1,256}$").unwrap());

static EVENT_SOURCE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^aws\.partner(/[\.\-_A-Za-z0-9]+){2,}$").unwrap());

// =============================================================================
// CUSTOM RESOURCE TYPES
// =============================================================================

/// Validate a user-defined resource type name (`Custom::Something`).
pub fn validate_custom_resource_type(resource_type: &str) -> SynthResult<()> {
    let Some(name) = resource_type.strip_prefix(CUSTOM_TYPE_PREFIX) else {
        return Err(ValidationError::new(
            Rule::Prefix,
            resource_type,
            format!(
                "Custom resource type must begin with \"{}\" ({})",
                CUSTOM_TYPE_PREFIX, resource_type
            ),
        )
        .into());
    };

    if !CUSTOM_TYPE_CHARS.is_match(name) {
        return Err(ValidationError::new(
            Rule::Charset,
            resource_type,
            format!(
                "Custom resource type name can only include alphanumeric characters and _@- ({})",
                resource_type
            ),
        )
        .into());
    }

    if resource_type.len() > MAX_CUSTOM_TYPE_LEN {
        return Err(ValidationError::new(
            Rule::Length,
            resource_type,
            format!(
                "Custom resource type length > {} ({})",
                MAX_CUSTOM_TYPE_LEN, resource_type
            ),
        )
        .into());
    }

    Ok(())
}

// =============================================================================
// EVENT BUS NAMES
// =============================================================================

/// Validate the mutually exclusive name / partner source name of a bus.
pub fn validate_event_bus_names(
    event_bus_name: Option<&Expr>,
    event_source_name: Option<&Expr>,
) -> SynthResult<()> {
    if event_bus_name.is_some() && event_source_name.is_some() {
        return Err(ValidationError::new(
            Rule::MutuallyExclusive,
            "eventBusName",
            "'eventBusName' and 'eventSourceName' cannot both be provided",
        )
        .into());
    }

    if let Some(name) = event_bus_name.and_then(Expr::as_str) {
        validate_event_bus_name(name)?;
    }

    if let Some(source) = event_source_name.and_then(Expr::as_str) {
        if !EVENT_SOURCE_NAME.is_match(source) {
            return Err(ValidationError::new(
                Rule::Pattern,
                source,
                format!(
                    "'eventSourceName' must satisfy: /{}/",
                    r"^aws\.partner(\/[\.\-_A-Za-z0-9]+){2,}$"
                ),
            )
            .into());
        }
    }

    Ok(())
}

fn validate_event_bus_name(name: &str) -> SynthResult<()> {
    if name == "default" {
        return Err(ValidationError::new(
            Rule::Reserved,
            name,
            "'eventBusName' must not be 'default'",
        )
        .into());
    }
    if name.contains('/') {
        return Err(ValidationError::new(
            Rule::ForbiddenChar,
            name,
            "'eventBusName' must not contain '/'",
        )
        .into());
    }
    if !EVENT_BUS_NAME.is_match(name) {
        return Err(ValidationError::new(
            Rule::Pattern,
            name,
            format!(
                "'eventBusName' must satisfy: /{}/",
                r"^[\/\.\-_A-Za-z0-9]{1,256}$"
            ),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Pseudo;

    fn rule_of(r: SynthResult<()>) -> Option<Rule> {
        r.err().and_then(|e| e.rule())
    }

    #[test]
    fn test_custom_type_accepts_valid() {
        validate_custom_resource_type("Custom::MyCustomResourceType").unwrap();
        validate_custom_resource_type("Custom::a_b@c-d").unwrap();
    }

    #[test]
    fn test_custom_type_prefix() {
        let err = validate_custom_resource_type("NoCustom::MyCustomResourceType").unwrap_err();
        assert_eq!(err.rule(), Some(Rule::Prefix));
        assert_eq!(
            err.to_string(),
            "Custom resource type must begin with \"Custom::\" (NoCustom::MyCustomResourceType)"
        );
    }

    #[test]
    fn test_custom_type_charset() {
        assert_eq!(
            rule_of(validate_custom_resource_type("Custom::My Custom?ResourceType")),
            Some(Rule::Charset)
        );
        assert_eq!(
            rule_of(validate_custom_resource_type("Custom::Question?")),
            Some(Rule::Charset)
        );
        assert_eq!(rule_of(validate_custom_resource_type("Custom::")), Some(Rule::Charset));
    }

    #[test]
    fn test_custom_type_length_boundary() {
        let ok = format!("Custom::{}", "A".repeat(52));
        assert_eq!(ok.len(), 60);
        validate_custom_resource_type(&ok).unwrap();

        let too_long = format!("Custom::{}", "A".repeat(53));
        let err = validate_custom_resource_type(&too_long).unwrap_err();
        assert_eq!(err.rule(), Some(Rule::Length));
        assert!(err.to_string().starts_with("Custom resource type length > 60"));
    }

    #[test]
    fn test_event_bus_both_names() {
        let name = Expr::string("myBus");
        assert_eq!(
            rule_of(validate_event_bus_names(Some(&name), Some(&name))),
            Some(Rule::MutuallyExclusive)
        );
    }

    #[test]
    fn test_event_bus_name_rules() {
        let check = |s: &str| rule_of(validate_event_bus_names(Some(&Expr::string(s)), None));
        assert_eq!(check("default"), Some(Rule::Reserved));
        assert_eq!(check("my/bus"), Some(Rule::ForbiddenChar));
        assert_eq!(check(""), Some(Rule::Pattern));
        assert_eq!(check("has space"), Some(Rule::Pattern));
        assert_eq!(check(&"a".repeat(257)), Some(Rule::Pattern));
        assert_eq!(check("myEventBus"), None);
    }

    #[test]
    fn test_event_bus_pattern_message() {
        let err = validate_event_bus_names(Some(&Expr::string("")), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            r"'eventBusName' must satisfy: /^[\/\.\-_A-Za-z0-9]{1,256}$/"
        );
    }

    #[test]
    fn test_event_source_rules() {
        let check = |s: &str| rule_of(validate_event_bus_names(None, Some(&Expr::string(s))));
        assert_eq!(check("aws.partner/PartnerName/acct1/repo1"), None);
        assert_eq!(check("invalid-partner"), Some(Rule::Pattern));
        assert_eq!(check(""), Some(Rule::Pattern));
        assert_eq!(check("aws.partner/OnlyOne"), Some(Rule::Pattern));

        let err = validate_event_bus_names(None, Some(&Expr::string("x"))).unwrap_err();
        assert!(err.to_string().starts_with("'eventSourceName' must satisfy: /^aws"));
    }

    #[test]
    fn test_deferred_names_skip_validation() {
        let name = Expr::pseudo(Pseudo::StackName);
        validate_event_bus_names(Some(&name), None).unwrap();
    }
}
