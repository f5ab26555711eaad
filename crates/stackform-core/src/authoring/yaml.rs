use super::dto::AppDto;
use anyhow::Result;

/// Parse a YAML string into an AppDto.
///
/// Expressions stay raw YAML here; they are compiled per stack by
/// [`super::build::compile_app`], which is also where references are checked.
pub fn parse_app_yaml(yaml_str: &str) -> Result<AppDto> {
    let dto: AppDto = serde_yaml::from_str(yaml_str)?;
    Ok(dto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::dto::*;

    #[test]
    fn test_basic_yaml_parse() {
        let yaml = r#"
stacks:
  - name: Producer
    env: { account: "111111111111", region: us-east-1 }
    resources:
      - id: Bus
        type: AWS::Events::EventBus
        properties: { Name: my-bus }
        removal_policy: retain
"#;
        let dto = parse_app_yaml(yaml).unwrap();
        assert!(dto.settings.fold);
        assert_eq!(dto.stacks.len(), 1);
        let stack = &dto.stacks[0];
        assert_eq!(stack.env.account.as_deref(), Some("111111111111"));
        assert_eq!(stack.env.partition, None);
        assert_eq!(stack.resources[0].resource_type, "AWS::Events::EventBus");
        assert_eq!(stack.resources[0].removal_policy.as_deref(), Some("retain"));
    }

    #[test]
    fn test_settings_and_defaults() {
        let yaml = r#"
settings: { fold: false }
stacks:
  - name: Empty
"#;
        let dto = parse_app_yaml(yaml).unwrap();
        assert!(!dto.settings.fold);
        let stack = &dto.stacks[0];
        assert!(stack.resources.is_empty());
        assert!(stack.conditions.is_empty());
        assert_eq!(stack.env, crate::env::StackEnv::agnostic());
    }

    #[test]
    fn test_output_forms() {
        let yaml = r#"
stacks:
  - name: S
    outputs:
      Bare: { GetAtt: [Bus, Arn] }
      Detailed:
        value: { Ref: Bus }
        export_name: bus-name
"#;
        let dto = parse_app_yaml(yaml).unwrap();
        let outputs = &dto.stacks[0].outputs;
        assert!(matches!(outputs["Bare"], OutputDto::Bare(_)));
        match &outputs["Detailed"] {
            OutputDto::Detailed { export_name, .. } => {
                assert_eq!(export_name.as_deref(), Some("bus-name"))
            }
            other => panic!("Expected Detailed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_type_fails() {
        let yaml = r#"
stacks:
  - name: S
    resources:
      - id: Bus
"#;
        assert!(parse_app_yaml(yaml).is_err());
    }
}
