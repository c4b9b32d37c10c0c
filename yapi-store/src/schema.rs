//! etcd key schema for the rule store and shared cache blob.

pub struct Schema {
    prefix: String,
}

impl Schema {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn rules_prefix(&self) -> String {
        format!("{}/rules/", self.prefix)
    }

    pub fn rule_key(&self, id: &str) -> String {
        format!("{}/rules/{}", self.prefix, id)
    }

    /// Single-key JSON blob holding the full rule snapshot, for the shared
    /// cache tier (spec.md §4.3: "prefer the shared cache; fall back to the
    /// store").
    pub fn snapshot_blob_key(&self) -> String {
        format!("{}/snapshot", self.prefix)
    }

    pub fn rules_changed_channel(&self) -> String {
        format!("{}/rules_changed", self.prefix)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new("/yapi")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed() {
        let schema = Schema::new("/yapi");
        assert_eq!(schema.rule_key("r1"), "/yapi/rules/r1");
        assert_eq!(schema.rules_prefix(), "/yapi/rules/");
        assert_eq!(schema.snapshot_blob_key(), "/yapi/snapshot");
    }

    #[test]
    fn trims_trailing_slash() {
        let schema = Schema::new("/yapi/");
        assert_eq!(schema.rule_key("r1"), "/yapi/rules/r1");
    }
}
