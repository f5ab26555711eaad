//! Whole-template checks for custom resources backed by a singleton function.

use pretty_assertions::assert_eq;
use serde_json::json;
use stackform_core::constructs::{
    CustomResource, CustomResourceProps, FunctionProps, Provider, SingletonFunction,
};
use stackform_core::naming::unique_id;
use stackform_core::{RemovalPolicy, Rule, Stack};

const PROVIDER_UUID: &str = "TestCustomResourceProvider";

fn test_custom_resource(
    stack: &mut Stack,
    id: &str,
    removal_policy: Option<RemovalPolicy>,
) -> CustomResource {
    let function = SingletonFunction::ensure(
        stack,
        PROVIDER_UUID,
        &FunctionProps::inline("def hello(): pass", "index.hello", "python2.7").timeout(300),
    )
    .unwrap();
    let mut props = CustomResourceProps::new(Provider::from_function(&function));
    props.removal_policy = removal_policy;
    CustomResource::new(stack, id, props).unwrap()
}

#[test]
fn custom_resource_added_twice_function_added_once() {
    let mut stack = Stack::new("Test");
    test_custom_resource(&mut stack, "Custom1", None);
    test_custom_resource(&mut stack, "Custom2", None);

    let role = unique_id(&["SingletonLambdaTestCustomResourceProvider", "ServiceRole", "Resource"]).unwrap();
    let function = unique_id(&["SingletonLambdaTestCustomResourceProvider", "Resource"]).unwrap();
    let custom1 = unique_id(&["Custom1", "Resource", "Default"]).unwrap();
    let custom2 = unique_id(&["Custom2", "Resource", "Default"]).unwrap();

    let custom = json!({
        "Type": "AWS::CloudFormation::CustomResource",
        "DeletionPolicy": "Delete",
        "UpdateReplacePolicy": "Delete",
        "Properties": {
            "ServiceToken": {"Fn::GetAtt": [function, "Arn"]}
        }
    });

    let mut resources = serde_json::Map::new();
    resources.insert(
        role.clone(),
        json!({
            "Type": "AWS::IAM::Role",
            "Properties": {
                "AssumeRolePolicyDocument": {
                    "Statement": [{
                        "Action": "sts:AssumeRole",
                        "Effect": "Allow",
                        "Principal": {"Service": "lambda.amazonaws.com"}
                    }],
                    "Version": "2012-10-17"
                },
                "ManagedPolicyArns": [{
                    "Fn::Join": ["", [
                        "arn:", {"Ref": "AWS::Partition"},
                        ":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"
                    ]]
                }]
            }
        }),
    );
    resources.insert(
        function.clone(),
        json!({
            "Type": "AWS::Lambda::Function",
            "Properties": {
                "Code": {"ZipFile": "def hello(): pass"},
                "Handler": "index.hello",
                "Role": {"Fn::GetAtt": [role, "Arn"]},
                "Runtime": "python2.7",
                "Timeout": 300
            },
            "DependsOn": [role]
        }),
    );
    resources.insert(custom1, custom.clone());
    resources.insert(custom2, custom);

    assert_eq!(
        stack.synth().unwrap().into_value(),
        json!({"Resources": resources})
    );
}

#[test]
fn logical_ids_keep_the_human_part() {
    let mut stack = Stack::new("Test");
    let cr = test_custom_resource(&mut stack, "myResource", None);
    assert!(cr.handle.logical_id.starts_with("myResource"));
    assert_eq!(cr.handle.logical_id.len(), "myResource".len() + 8);
    assert_eq!(
        stack.resolve(&cr.reference()).unwrap(),
        stackform_core::Expr::reference(cr.handle.target())
    );
}

#[test]
fn removal_policy_table() {
    let cases = [
        (None, "Delete"),
        (Some(RemovalPolicy::Destroy), "Delete"),
        (Some(RemovalPolicy::Retain), "Retain"),
    ];
    for (policy, expected) in cases {
        let mut stack = Stack::new("Test");
        let cr = test_custom_resource(&mut stack, "Custom", policy);
        let t = stack.synth().unwrap();
        let def = t.resource(&cr.handle.logical_id).unwrap();
        assert_eq!(def["DeletionPolicy"], expected, "policy {:?}", policy);
        assert_eq!(def["UpdateReplacePolicy"], expected, "policy {:?}", policy);
    }
}

#[test]
fn invalid_resource_types_are_rejected() {
    let cases = [
        ("NoCustom::MyCustomResourceType", Rule::Prefix, "Custom resource type must begin with \"Custom::\""),
        ("Custom::My Custom?ResourceType", Rule::Charset, "Custom resource type name can only include alphanumeric characters and"),
        (
            "Custom::0123456789012345678901234567890123456789012345678901234567891",
            Rule::Length,
            "Custom resource type length > 60",
        ),
    ];
    for (resource_type, rule, message) in cases {
        let mut stack = Stack::new("Test");
        let topic = stack
            .add_resource::<&str, _>(&["Provider", "Resource"], "AWS::SNS::Topic", [])
            .unwrap();
        let mut props = CustomResourceProps::new(Provider::from_topic(&topic));
        props.resource_type = Some(resource_type.to_string());

        let err = CustomResource::new(&mut stack, "MyCustomResource", props).unwrap_err();
        assert_eq!(err.rule(), Some(rule), "{}", resource_type);
        assert!(err.to_string().contains(message), "{}", err);
    }
}
