//! Activity parameter contracts and work-item arguments.
//!
//! The remote engine matches submission arguments to activity
//! parameters by name and rejects mismatches only at job time.
//! `validate_arguments` catches name and shape mismatches locally,
//! before any network call.

use crate::error::Error;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Argument names the service interprets itself (completion hooks).
/// They are legal at submission without a matching contract entry.
pub const RESERVED_ARGUMENTS: &[&str] = &["onComplete", "onProgress"];

/// Transfer verb for one contract slot or write argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    Put,
    Post,
}

impl Default for Verb {
    fn default() -> Self {
        Verb::Get
    }
}

impl Verb {
    /// Get slots consume data; put/post slots produce it.
    pub fn is_write(&self) -> bool {
        matches!(self, Verb::Put | Verb::Post)
    }
}

/// One named slot in an activity's parameter contract.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub verb: Verb,
    #[serde(rename = "localName", default, skip_serializing_if = "Option::is_none")]
    pub local_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<bool>,
    #[serde(rename = "ondemand", default, skip_serializing_if = "Option::is_none")]
    pub on_demand: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
}

impl Parameter {
    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }
}

/// Argument name to parameter slot, as declared on the activity.
pub type ParameterContract = BTreeMap<String, Parameter>;

/// One argument supplied at work-item submission, tagged by transfer
/// direction instead of the service's free-form property bag.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkItemArgument {
    /// The engine downloads the referenced resource (default GET).
    UrlRead {
        url: String,
        zip: Option<bool>,
        path_in_zip: Option<String>,
        local_name: Option<String>,
    },
    /// The engine uploads its output to the URL with the given verb and
    /// headers (e.g. a bearer-authorized PUT into a bucket).
    UrlWrite {
        url: String,
        verb: Verb,
        headers: BTreeMap<String, String>,
    },
    /// Inline payload passed as a data URI, no fetch involved.
    InlineData { media_type: String, content: String },
}

impl WorkItemArgument {
    pub fn read(url: impl Into<String>) -> Self {
        WorkItemArgument::UrlRead {
            url: url.into(),
            zip: None,
            path_in_zip: None,
            local_name: None,
        }
    }

    pub fn inline_json(content: impl Into<String>) -> Self {
        WorkItemArgument::InlineData {
            media_type: "application/json".to_string(),
            content: content.into(),
        }
    }

    /// Wire shape the service expects for this argument.
    pub fn to_wire(&self) -> Value {
        match self {
            WorkItemArgument::UrlRead {
                url,
                zip,
                path_in_zip,
                local_name,
            } => {
                let mut obj = Map::new();
                obj.insert("url".to_string(), json!(url));
                if let Some(zip) = zip {
                    obj.insert("zip".to_string(), json!(zip));
                }
                if let Some(path) = path_in_zip {
                    obj.insert("pathInZip".to_string(), json!(path));
                }
                if let Some(local) = local_name {
                    obj.insert("localName".to_string(), json!(local));
                }
                Value::Object(obj)
            }
            WorkItemArgument::UrlWrite { url, verb, headers } => json!({
                "url": url,
                "verb": verb,
                "headers": headers,
            }),
            WorkItemArgument::InlineData {
                media_type,
                content,
            } => json!({ "url": format!("data:{media_type},{content}") }),
        }
    }
}

impl Serialize for WorkItemArgument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// Checks the submission argument map against the activity's contract.
///
/// Rules:
/// - every non-reserved argument name must be declared by the contract;
/// - every non-optional contract slot must be supplied;
/// - get slots take read-side arguments (`UrlRead`/`InlineData`),
///   put/post slots take `UrlWrite`. The write verb itself may differ
///   from the declared one (the submission verb wins remotely).
pub fn validate_arguments(
    contract: &ParameterContract,
    args: &BTreeMap<String, WorkItemArgument>,
) -> Result<(), Error> {
    for (name, arg) in args {
        if RESERVED_ARGUMENTS.contains(&name.as_str()) {
            continue;
        }
        let Some(param) = contract.get(name) else {
            return Err(Error::ContractMismatch(format!(
                "argument `{name}` is not declared by the activity"
            )));
        };
        let write_slot = param.verb.is_write();
        let write_arg = matches!(arg, WorkItemArgument::UrlWrite { .. });
        if write_slot != write_arg {
            return Err(Error::ContractMismatch(format!(
                "argument `{name}` direction does not match the declared verb"
            )));
        }
    }
    for (name, param) in contract {
        if !param.is_optional() && !args.contains_key(name) {
            return Err(Error::ContractMismatch(format!(
                "required argument `{name}` is missing"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> ParameterContract {
        let mut c = ParameterContract::new();
        c.insert("InputDoc".to_string(), Parameter::default());
        c.insert(
            "Params".to_string(),
            Parameter {
                local_name: Some("params.json".to_string()),
                ..Parameter::default()
            },
        );
        c.insert(
            "Result".to_string(),
            Parameter {
                verb: Verb::Post,
                optional: Some(true),
                local_name: Some("result.dat".to_string()),
                ..Parameter::default()
            },
        );
        c
    }

    fn read_args() -> BTreeMap<String, WorkItemArgument> {
        let mut args = BTreeMap::new();
        args.insert(
            "InputDoc".to_string(),
            WorkItemArgument::read("https://example.test/in"),
        );
        args.insert(
            "Params".to_string(),
            WorkItemArgument::inline_json(r#"{"height":"16 in"}"#),
        );
        args
    }

    #[test]
    fn accepts_matching_arguments() {
        assert!(validate_arguments(&contract(), &read_args()).is_ok());
    }

    #[test]
    fn rejects_undeclared_argument() {
        let mut args = read_args();
        args.insert(
            "Mystery".to_string(),
            WorkItemArgument::read("https://example.test/x"),
        );
        let err = validate_arguments(&contract(), &args).unwrap_err();
        assert!(matches!(err, Error::ContractMismatch(_)));
    }

    #[test]
    fn rejects_missing_required_argument() {
        let mut args = read_args();
        args.remove("InputDoc");
        let err = validate_arguments(&contract(), &args).unwrap_err();
        assert!(matches!(err, Error::ContractMismatch(_)));
    }

    #[test]
    fn rejects_write_argument_in_read_slot() {
        let mut args = read_args();
        args.insert(
            "InputDoc".to_string(),
            WorkItemArgument::UrlWrite {
                url: "https://example.test/out".to_string(),
                verb: Verb::Put,
                headers: BTreeMap::new(),
            },
        );
        let err = validate_arguments(&contract(), &args).unwrap_err();
        assert!(matches!(err, Error::ContractMismatch(_)));
    }

    #[test]
    fn write_verb_may_differ_from_declared() {
        // Contract says post; the submission uses put. Allowed.
        let mut args = read_args();
        args.insert(
            "Result".to_string(),
            WorkItemArgument::UrlWrite {
                url: "https://example.test/out".to_string(),
                verb: Verb::Put,
                headers: BTreeMap::new(),
            },
        );
        assert!(validate_arguments(&contract(), &args).is_ok());
    }

    #[test]
    fn reserved_arguments_skip_the_contract() {
        let mut args = read_args();
        args.insert(
            "onComplete".to_string(),
            WorkItemArgument::UrlWrite {
                url: "https://hooks.example.test/done".to_string(),
                verb: Verb::Post,
                headers: BTreeMap::new(),
            },
        );
        assert!(validate_arguments(&contract(), &args).is_ok());
    }

    #[test]
    fn read_argument_wire_shape() {
        let arg = WorkItemArgument::UrlRead {
            url: "https://example.test/in".to_string(),
            zip: Some(false),
            path_in_zip: Some("Top.iam".to_string()),
            local_name: Some("Assy".to_string()),
        };
        assert_eq!(
            arg.to_wire(),
            json!({
                "url": "https://example.test/in",
                "zip": false,
                "pathInZip": "Top.iam",
                "localName": "Assy",
            })
        );
    }

    #[test]
    fn inline_data_becomes_data_uri() {
        let arg = WorkItemArgument::inline_json(r#"{"width":"10 in"}"#);
        assert_eq!(
            arg.to_wire(),
            json!({ "url": "data:application/json,{\"width\":\"10 in\"}" })
        );
    }

    #[test]
    fn write_argument_carries_verb_and_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer t".to_string());
        let arg = WorkItemArgument::UrlWrite {
            url: "https://example.test/out".to_string(),
            verb: Verb::Put,
            headers,
        };
        assert_eq!(
            arg.to_wire(),
            json!({
                "url": "https://example.test/out",
                "verb": "put",
                "headers": { "Authorization": "Bearer t" },
            })
        );
    }
}
