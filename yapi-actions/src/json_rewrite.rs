//! JSON body rewrite: `override_json` + `remove_json` (spec.md §4.7).
//!
//! Owns both the JSON-path tokeniser (`yapi_core::jsonpath`, which also
//! validates admin input at rule-save time) and the mutation itself, per
//! SPEC_FULL's design note: "a single tokeniser that both validates admin
//! input and drives the mutator" rather than a second, separate path syntax.

use crate::request::OutboundRequest;
use serde_json::Value;
use std::collections::HashMap;
use yapi_core::jsonpath::{self, Token};

/// Applies `overrides` then `removals` to `req.body`, re-serialising and
/// fixing up `Content-Length` on success. A no-op (`Ok(())`, body
/// untouched) when both maps are empty — most rules carry no JSON
/// rewriting at all and shouldn't pay a parse/precondition cost.
pub fn apply(
    overrides: &HashMap<String, Value>,
    removals: &[String],
    req: &mut OutboundRequest,
) -> Result<(), String> {
    if overrides.is_empty() && removals.is_empty() {
        return Ok(());
    }

    let is_json = req
        .content_type()
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err("request is not application/json".to_string());
    }

    let body = match req.body.as_ref() {
        Some(b) if !b.is_empty() => b,
        _ => return Err("request has no body".to_string()),
    };

    let mut value: Value =
        serde_json::from_slice(body).map_err(|e| format!("invalid JSON body: {e}"))?;

    for (path, new_value) in overrides {
        let tokens = jsonpath::parse(path).map_err(|e| e.to_string())?;
        set_path(&mut value, &tokens, new_value.clone());
    }
    for path in removals {
        let tokens = jsonpath::parse(path).map_err(|e| e.to_string())?;
        remove_path(&mut value, &tokens);
    }

    let new_body = serde_json::to_vec(&value).map_err(|e| format!("re-serialize failed: {e}"))?;
    req.set_header("content-length", new_body.len().to_string());
    req.body = Some(new_body);
    Ok(())
}

/// Set a value at `tokens`, creating intermediate objects/arrays as needed.
/// An array index at exactly `len` appends; an index beyond `len` pads with
/// `null` up to that position first (spec.md §8 boundary behaviour).
fn set_path(root: &mut Value, tokens: &[Token], new_value: Value) {
    let Some((last, parents)) = tokens.split_last() else {
        return;
    };
    let parent = navigate_create(root, parents);
    match last {
        Token::Key(k) => {
            if !parent.is_object() {
                *parent = Value::Object(Default::default());
            }
            parent
                .as_object_mut()
                .expect("just coerced to object")
                .insert(k.clone(), new_value);
        }
        Token::Index(i) => {
            if !parent.is_array() {
                *parent = Value::Array(Vec::new());
            }
            let arr = parent.as_array_mut().expect("just coerced to array");
            while arr.len() <= *i {
                arr.push(Value::Null);
            }
            arr[*i] = new_value;
        }
    }
}

fn navigate_create<'a>(root: &'a mut Value, tokens: &[Token]) -> &'a mut Value {
    let mut cur = root;
    for tok in tokens {
        cur = match tok {
            Token::Key(k) => {
                if !cur.is_object() {
                    *cur = Value::Object(Default::default());
                }
                cur.as_object_mut()
                    .expect("just coerced to object")
                    .entry(k.clone())
                    .or_insert(Value::Null)
            }
            Token::Index(i) => {
                if !cur.is_array() {
                    *cur = Value::Array(Vec::new());
                }
                let arr = cur.as_array_mut().expect("just coerced to array");
                while arr.len() <= *i {
                    arr.push(Value::Null);
                }
                &mut arr[*i]
            }
        };
    }
    cur
}

/// Remove the key/index addressed by `tokens`. Missing intermediate
/// segments or an out-of-range array index are a no-op (spec.md §4.7).
fn remove_path(root: &mut Value, tokens: &[Token]) {
    let Some((last, parents)) = tokens.split_last() else {
        return;
    };

    let mut cur = root;
    for tok in parents {
        let next = match tok {
            Token::Key(k) => cur.as_object_mut().and_then(|m| m.get_mut(k)),
            Token::Index(i) => cur.as_array_mut().and_then(|a| a.get_mut(*i)),
        };
        match next {
            Some(n) => cur = n,
            None => return,
        }
    }

    match last {
        Token::Key(k) => {
            if let Some(obj) = cur.as_object_mut() {
                obj.remove(k);
            }
        }
        Token::Index(i) => {
            if let Some(arr) = cur.as_array_mut() {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_req(body: &str) -> OutboundRequest {
        let mut req = OutboundRequest::new("/x");
        req.set_header("content-type", "application/json");
        req.body = Some(body.as_bytes().to_vec());
        req
    }

    // ── preconditions ──
    #[test]
    fn empty_maps_are_a_noop_even_without_body() {
        let mut req = OutboundRequest::new("/x");
        assert!(apply(&HashMap::new(), &[], &mut req).is_ok());
    }

    #[test]
    fn non_json_content_type_fails() {
        let mut req = OutboundRequest::new("/x");
        req.set_header("content-type", "text/plain");
        req.body = Some(b"hi".to_vec());
        let overrides = HashMap::from([("a".to_string(), json!(1))]);
        assert!(apply(&overrides, &[], &mut req).is_err());
    }

    #[test]
    fn missing_body_fails() {
        let mut req = OutboundRequest::new("/x");
        req.set_header("content-type", "application/json");
        let overrides = HashMap::from([("a".to_string(), json!(1))]);
        assert!(apply(&overrides, &[], &mut req).is_err());
    }

    // ── override ──
    #[test]
    fn override_existing_key() {
        let mut req = json_req(r#"{"messages":[{"role":"user","content":"hi"}]}"#);
        let overrides = HashMap::from([("messages[0].role".to_string(), json!("assistant"))]);
        apply(&overrides, &[], &mut req).unwrap();
        let v: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(v["messages"][0]["role"], "assistant");
    }

    #[test]
    fn override_updates_content_length_header() {
        let mut req = json_req(r#"{"a":1}"#);
        let overrides = HashMap::from([("a".to_string(), json!(1234567890))]);
        apply(&overrides, &[], &mut req).unwrap();
        let cl: usize = req.get_header("content-length").unwrap().parse().unwrap();
        assert_eq!(cl, req.body.as_ref().unwrap().len());
    }

    #[test]
    fn array_append_at_exact_length() {
        let mut v = json!({"items": [1, 2]});
        let tokens = jsonpath::parse("items[2]").unwrap();
        set_path(&mut v, &tokens, json!(3));
        assert_eq!(v["items"], json!([1, 2, 3]));
    }

    #[test]
    fn array_index_beyond_length_pads_with_null() {
        let mut v = json!({"items": [1]});
        let tokens = jsonpath::parse("items[3]").unwrap();
        set_path(&mut v, &tokens, json!("x"));
        assert_eq!(v["items"], json!([1, null, null, "x"]));
    }

    #[test]
    fn creates_intermediate_objects() {
        let mut v = json!({});
        let tokens = jsonpath::parse("a.b.c").unwrap();
        set_path(&mut v, &tokens, json!(true));
        assert_eq!(v["a"]["b"]["c"], json!(true));
    }

    // ── remove ──
    #[test]
    fn remove_existing_key() {
        let mut req = json_req(r#"{"metadata":{"debug":true,"trace_id":"foo"}}"#);
        apply(&HashMap::new(), &["metadata.debug".to_string()], &mut req).unwrap();
        let v: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(v["metadata"]["trace_id"], "foo");
        assert!(v["metadata"].get("debug").is_none());
    }

    #[test]
    fn remove_missing_path_is_a_noop() {
        let mut v = json!({"a": 1});
        let tokens = jsonpath::parse("b.c").unwrap();
        remove_path(&mut v, &tokens);
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn remove_out_of_range_index_is_a_noop() {
        let mut v = json!({"items": [1, 2]});
        let tokens = jsonpath::parse("items[9]").unwrap();
        remove_path(&mut v, &tokens);
        assert_eq!(v["items"], json!([1, 2]));
    }

    // ── end-to-end scenario (spec.md §8, scenario 1) ──
    #[test]
    fn header_json_override_and_remove_combined() {
        let mut req = json_req(
            r#"{"messages":[{"role":"user","content":"original"}],"metadata":{"debug":true,"trace_id":"foo"}}"#,
        );
        let overrides = HashMap::from([
            ("messages[0].role".to_string(), json!("assistant")),
            ("messages[0].content".to_string(), json!("rewritten")),
        ]);
        let removals = vec!["metadata.debug".to_string()];
        apply(&overrides, &removals, &mut req).unwrap();

        let v: Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({
                "messages": [{"role": "assistant", "content": "rewritten"}],
                "metadata": {"trace_id": "foo"}
            })
        );
    }
}
