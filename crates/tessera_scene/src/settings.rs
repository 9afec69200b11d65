use serde::{Deserialize, Serialize};

/// Scene update configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Log an error whenever a recomputed world bound is not finite.
    pub validate_bounds: bool,
    /// Initial capacity of each per-category state stack.
    pub initial_stack_capacity: usize,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            validate_bounds: true,
            initial_stack_capacity: 16,
        }
    }
}

impl SceneSettings {
    #[must_use]
    pub fn with_validate_bounds(mut self, validate: bool) -> Self {
        self.validate_bounds = validate;
        self
    }

    #[must_use]
    pub fn with_initial_stack_capacity(mut self, capacity: usize) -> Self {
        self.initial_stack_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let settings: SceneSettings = serde_json::from_str(r#"{ "validate_bounds": false }"#).unwrap();
        assert!(!settings.validate_bounds);
        assert_eq!(settings.initial_stack_capacity, 16);
    }
}
