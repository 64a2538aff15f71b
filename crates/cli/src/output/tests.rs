use super::*;

#[derive(Serialize)]
struct Sample {
	value: u32,
}

#[test]
fn result_builder_success() {
	let result = ResultBuilder::new("simulate").data(Sample { value: 1 }).build();

	assert!(result.ok);
	assert_eq!(result.command, "simulate");
	assert_eq!(result.schema_version, SCHEMA_VERSION);
	assert!(result.error.is_none());
	assert!(result.timings.is_some());
}

#[test]
fn result_builder_error() {
	let result: CommandResult<Sample> = ResultBuilder::new("simulate")
		.error(ErrorCode::InvalidScenario, "unknown parent target")
		.build();

	assert!(!result.ok);
	assert!(result.data.is_none());
	assert_eq!(result.error.as_ref().unwrap().code, ErrorCode::InvalidScenario);
}

#[test]
fn error_result_serializes_without_data() {
	let result: CommandResult<Sample> = ResultBuilder::new("simulate").error(ErrorCode::SessionError, "stuck").build();
	let json = serde_json::to_value(&result).unwrap();

	assert_eq!(json["ok"], false);
	assert_eq!(json["schemaVersion"], 1);
	assert_eq!(json["error"]["code"], "SESSION_ERROR");
	assert!(json.get("data").is_none());
}

#[test]
fn error_code_display() {
	assert_eq!(ErrorCode::InvalidScenario.to_string(), "INVALID_SCENARIO");
	assert_eq!(ErrorCode::SessionError.to_string(), "SESSION_ERROR");
}
