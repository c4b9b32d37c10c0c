//! The mutable view of an outbound request the action pipeline rewrites.
//! Deliberately transport-agnostic (plain `Vec<(String, String)>` headers
//! rather than `http::HeaderMap`) so `yapi-proxy`'s monoio/httparse hot
//! path can populate and drain it without an extra conversion layer.

#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl OutboundRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite: remove any existing occurrences, then insert one.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.into()));
    }

    /// Append without removing an existing value.
    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_overwrites_all_prior_occurrences() {
        let mut req = OutboundRequest::new("/x");
        req.add_header("X-Foo", "a");
        req.add_header("X-Foo", "b");
        req.set_header("X-Foo", "c");
        let values: Vec<_> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("x-foo"))
            .collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].1, "c");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut req = OutboundRequest::new("/x");
        req.set_header("Content-Type", "application/json");
        assert_eq!(req.get_header("content-type"), Some("application/json"));
    }
}
