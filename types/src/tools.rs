#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum Tool {
    #[serde(rename = "function")]
    Function(FunctionTool),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionTool {
    /// The name of the function
    name: String,

    /// The description of the function
    description: String,

    /// The parameters of the function in JSON Schema format
    parameters: serde_json::Value,
}

impl FunctionTool {
    pub fn new(name: String, description: String, parameters: serde_json::Value) -> Self {
        Self {
            name,
            description,
            parameters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_tool_serializes_flat() {
        // The realtime session API takes tools with the discriminant beside
        // the function fields, not nested under "function".
        let tool = Tool::Function(FunctionTool::new(
            "add_task".to_string(),
            "Add a task".to_string(),
            serde_json::json!({"type": "object"}),
        ));
        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["name"], "add_task");
        assert_eq!(json["parameters"]["type"], "object");
    }
}
