// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The small tagged value-kind used by every capability record.
//!
//! The wire is always ASCII text; `ValueType` never gets hoisted into a
//! generic type parameter, it just validates (and, for `bool`, normalises)
//! the string a caller hands us before it goes out on the wire verbatim.

use crate::error::DriverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    None,
    String,
    Int,
    Float,
    Bool,
}

impl ValueType {
    /// Validate (and, for `bool`, normalise) `value`. The original string is
    /// otherwise forwarded untouched -- no numeric re-formatting.
    pub fn validate(&self, value: &str) -> Result<String, DriverError> {
        match self {
            ValueType::None => {
                if value.is_empty() {
                    Ok(String::new())
                } else {
                    Err(DriverError::RequestValidationError {
                        reason: format!("value \"{value}\" not expected for this parameter"),
                    })
                }
            }
            ValueType::String => Ok(value.to_string()),
            ValueType::Int => value.parse::<i64>().map(|_| value.to_string()).map_err(|_| {
                DriverError::RequestValidationError {
                    reason: format!("\"{value}\" is not a valid integer"),
                }
            }),
            ValueType::Float => value.parse::<f64>().map(|_| value.to_string()).map_err(|_| {
                DriverError::RequestValidationError {
                    reason: format!("\"{value}\" is not a valid float"),
                }
            }),
            ValueType::Bool => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok("1".to_string()),
                "false" | "0" | "no" => Ok("0".to_string()),
                _ => Err(DriverError::RequestValidationError {
                    reason: format!("\"{value}\" is not a valid boolean"),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_normalises_case_insensitively() {
        assert_eq!(ValueType::Bool.validate("TRUE").unwrap(), "1");
        assert_eq!(ValueType::Bool.validate("No").unwrap(), "0");
        assert!(ValueType::Bool.validate("maybe").is_err());
    }

    #[test]
    fn float_and_int_pass_through_original_text() {
        assert_eq!(ValueType::Float.validate("19.50").unwrap(), "19.50");
        assert_eq!(ValueType::Int.validate("50000").unwrap(), "50000");
        assert!(ValueType::Int.validate("3.14").is_err());
    }

    #[test]
    fn none_rejects_non_empty_values() {
        assert!(ValueType::None.validate("").is_ok());
        assert!(ValueType::None.validate("84").is_err());
    }
}
