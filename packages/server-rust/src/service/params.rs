//! Request parameter decoding.
//!
//! Alpaca clients send `GET` arguments in the query string and `PUT`
//! arguments as a form body. Parameter names are case-insensitive.

use super::operation::RequestError;

/// Decoded request arguments, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    #[must_use]
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Decodes a URL query string.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MalformedBody`] if the string is not valid
    /// `application/x-www-form-urlencoded` data.
    pub fn from_query(query: Option<&str>) -> Result<Self, RequestError> {
        match query {
            Some(q) if !q.is_empty() => serde_urlencoded::from_str(q)
                .map(Self::new)
                .map_err(|e| RequestError::MalformedBody(e.to_string())),
            _ => Ok(Self::default()),
        }
    }

    /// Decodes a `PUT` body, choosing the format from the content type.
    ///
    /// JSON is used when the content type mentions it; anything else is
    /// treated as a form body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MalformedBody`] if the body cannot be decoded.
    pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self, RequestError> {
        if body.is_empty() {
            return Ok(Self::default());
        }
        if content_type.is_some_and(|ct| ct.contains("json")) {
            Self::from_json(body)
        } else {
            serde_urlencoded::from_bytes(body)
                .map(Self::new)
                .map_err(|e| RequestError::MalformedBody(e.to_string()))
        }
    }

    fn from_json(body: &[u8]) -> Result<Self, RequestError> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)
            .map_err(|e| RequestError::MalformedBody(e.to_string()))?;
        let pairs = object
            .into_iter()
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect();
        Ok(Self { pairs })
    }

    /// Appends all pairs of `other`; earlier pairs take precedence on lookup.
    pub fn extend(&mut self, other: Params) {
        self.pairs.extend(other.pairs);
    }

    /// First value whose name matches `name` case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, name: &str) -> Result<&str, RequestError> {
        self.get(name)
            .ok_or_else(|| RequestError::MissingParameter(name.to_string()))
    }

    /// # Errors
    ///
    /// Missing or non-numeric argument.
    pub fn required_f64(&self, name: &str) -> Result<f64, RequestError> {
        let raw = self.required(name)?;
        raw.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RequestError::invalid(name, raw))
    }

    /// # Errors
    ///
    /// Missing or non-integer argument.
    pub fn required_i64(&self, name: &str) -> Result<i64, RequestError> {
        let raw = self.required(name)?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| RequestError::invalid(name, raw))
    }

    /// Boolean argument. Accepts `true/false`, `1/0`, `yes/no` and `on/off` in any case.
    ///
    /// # Errors
    ///
    /// Missing or unrecognised argument.
    pub fn required_bool(&self, name: &str) -> Result<bool, RequestError> {
        let raw = self.required(name)?;
        parse_bool(raw).ok_or_else(|| RequestError::invalid(name, raw))
    }

    /// # Errors
    ///
    /// Missing argument.
    pub fn required_string(&self, name: &str) -> Result<String, RequestError> {
        self.required(name).map(str::to_string)
    }

    /// Optional string argument, empty when absent.
    #[must_use]
    pub fn string_or_empty(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    /// `ClientTransactionID`, defaulting to 0 when absent.
    ///
    /// # Errors
    ///
    /// Present but not an unsigned 32-bit integer.
    pub fn client_transaction_id(&self) -> Result<u32, RequestError> {
        match self.get("ClientTransactionID") {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| RequestError::invalid("ClientTransactionID", raw)),
        }
    }
}

/// Lenient boolean parsing shared by every boolean argument.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
