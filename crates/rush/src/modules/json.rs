//! `JSON.parse` and `JSON.stringify`.
//!
//! The parser is a small byte-walking recursive-descent JSON reader: it
//! preserves object key insertion order, distinguishes integer from float
//! number tokens by grammar (so `1` parses as Integer and `1.0` as Float),
//! and delegates string escape handling to `serde_json`. `stringify` is the
//! inverse; object keys must be strings.

use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    value::{HashKey, Value, format_float},
};

/// Depth ceiling for both parsing and serialization; cyclic arrays would
/// otherwise recurse forever.
const JSON_RECURSION_LIMIT: usize = 1000;

/// Dispatches `JSON.<name>(args)`.
pub fn call_namespace(name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "parse" => {
            if args.len() != 1 {
                return Err(RunError::wrong_arity(1, args.len()));
            }
            match &args[0] {
                Value::Str(s) => parse_json(s),
                other => Err(RunError::type_error(format!(
                    "JSON.parse argument must be STRING, got {}",
                    other.type_name()
                ))),
            }
        }
        "stringify" => {
            if args.len() != 1 {
                return Err(RunError::wrong_arity(1, args.len()));
            }
            stringify(&args[0]).map(Value::string)
        }
        other => Err(RunError::fatal(format!("undefined method {other} for JSON"))),
    }
}

/// Parses a JSON document into a plain Rush value.
pub fn parse_json(input: &str) -> RunResult<Value> {
    let mut parser = JsonParser { src: input, pos: 0 };
    parser.skip_ws();
    let value = parser.parse_value(0)?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.error("extra data"));
    }
    Ok(value)
}

/// Byte-walking JSON reader.
struct JsonParser<'a> {
    src: &'a str,
    pos: usize,
}

impl JsonParser<'_> {
    fn parse_value(&mut self, depth: usize) -> RunResult<Value> {
        if depth > JSON_RECURSION_LIMIT {
            return Err(RunError::validation_error("invalid json: structure too deeply nested"));
        }
        self.skip_ws();
        match self.peek_byte() {
            Some(b'n') => {
                self.expect_keyword("null")?;
                Ok(Value::Null)
            }
            Some(b't') => {
                self.expect_keyword("true")?;
                Ok(Value::Boolean(true))
            }
            Some(b'f') => {
                self.expect_keyword("false")?;
                Ok(Value::Boolean(false))
            }
            Some(b'"') => Ok(Value::string(self.parse_string()?)),
            Some(b'[') => self.parse_array(depth),
            Some(b'{') => self.parse_object(depth),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(self.error("expecting value")),
        }
    }

    fn parse_object(&mut self, depth: usize) -> RunResult<Value> {
        self.consume_byte(b'{')?;
        let mut map = IndexMap::new();
        self.skip_ws();
        if self.try_consume_byte(b'}') {
            return Ok(Value::hash(map));
        }
        loop {
            self.skip_ws();
            if self.peek_byte() != Some(b'"') {
                return Err(self.error("expecting property name enclosed in double quotes"));
            }
            let key = self.parse_string()?;
            self.skip_ws();
            self.consume_byte(b':')?;
            let value = self.parse_value(depth + 1)?;
            map.insert(HashKey::Str(key.into()), value);
            self.skip_ws();
            if self.try_consume_byte(b'}') {
                break;
            }
            self.consume_byte(b',')?;
        }
        Ok(Value::hash(map))
    }

    fn parse_array(&mut self, depth: usize) -> RunResult<Value> {
        self.consume_byte(b'[')?;
        let mut values = vec![];
        self.skip_ws();
        if self.try_consume_byte(b']') {
            return Ok(Value::array(values));
        }
        loop {
            values.push(self.parse_value(depth + 1)?);
            self.skip_ws();
            if self.try_consume_byte(b']') {
                break;
            }
            self.consume_byte(b',')?;
        }
        Ok(Value::array(values))
    }

    /// Numbers without a fractional or exponent part become Integer, the
    /// rest Float.
    fn parse_number(&mut self) -> RunResult<Value> {
        let start = self.pos;
        self.try_consume_byte(b'-');

        match self.peek_byte() {
            Some(b'0') => {
                self.pos += 1;
            }
            Some(b'1'..=b'9') => {
                while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
            _ => return Err(self.error("invalid number")),
        }

        let mut is_float = false;
        if self.try_consume_byte(b'.') {
            is_float = true;
            if !matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                return Err(self.error("invalid number"));
            }
            while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_byte(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                return Err(self.error("invalid number"));
            }
            while matches!(self.peek_byte(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }

        let token = &self.src[start..self.pos];
        if is_float {
            token
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|err| RunError::validation_error(format!("invalid json: {err}")))
        } else {
            match token.parse::<i64>() {
                Ok(n) => Ok(Value::Integer(n)),
                // Out-of-range integer tokens fall back to float.
                Err(_) => token
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|err| RunError::validation_error(format!("invalid json: {err}"))),
            }
        }
    }

    /// Slices out a string token and lets serde_json unescape it.
    fn parse_string(&mut self) -> RunResult<String> {
        let start = self.pos;
        self.consume_byte(b'"')?;
        while let Some(byte) = self.peek_byte() {
            match byte {
                b'"' => {
                    self.pos += 1;
                    let token = &self.src[start..self.pos];
                    return serde_json::from_str::<String>(token)
                        .map_err(|err| RunError::validation_error(format!("invalid json: {err}")));
                }
                b'\\' => {
                    self.pos += 2;
                }
                b if b < 0x20 => {
                    return Err(self.error("invalid control character in string"));
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
        Err(self.error("unterminated string"))
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_byte(), Some(b' ' | b'\n' | b'\r' | b'\t')) {
            self.pos += 1;
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn consume_byte(&mut self, expected: u8) -> RunResult<()> {
        if self.peek_byte() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expecting '{}'", expected as char)))
        }
    }

    fn try_consume_byte(&mut self, expected: u8) -> bool {
        if self.peek_byte() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> RunResult<()> {
        if self.src[self.pos..].starts_with(keyword) {
            self.pos += keyword.len();
            Ok(())
        } else {
            Err(self.error(format!("expecting '{keyword}'")))
        }
    }

    fn error(&self, message: impl Into<String>) -> RunError {
        RunError::validation_error(format!("invalid json: {} at offset {}", message.into(), self.pos))
    }
}

/// Serializes a value to its JSON text.
pub fn stringify(value: &Value) -> RunResult<String> {
    let mut out = String::new();
    write_json(value, &mut out, 0)?;
    Ok(out)
}

fn write_json(value: &Value, out: &mut String, depth: usize) -> RunResult<()> {
    if depth > JSON_RECURSION_LIMIT {
        return Err(RunError::validation_error("invalid json: structure too deeply nested"));
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(n) => out.push_str(&n.to_string()),
        Value::Float(f) => {
            if f.is_nan() || f.is_infinite() {
                return Err(RunError::type_error("cannot serialize non-finite FLOAT to json"));
            }
            out.push_str(&format_float(*f));
        }
        Value::Str(s) => {
            out.push_str(&serde_json::to_string(&**s).unwrap_or_else(|_| "\"\"".to_string()));
        }
        Value::Array(values) => {
            out.push('[');
            for (i, item) in values.borrow().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, out, depth + 1)?;
            }
            out.push(']');
        }
        Value::Hash(map) => {
            out.push('{');
            for (i, (key, item)) in map.borrow().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let HashKey::Str(key) = key else {
                    return Err(RunError::type_error("json object keys must be STRING"));
                };
                out.push_str(&serde_json::to_string(&**key).unwrap_or_else(|_| "\"\"".to_string()));
                out.push(':');
                write_json(item, out, depth + 1)?;
            }
            out.push('}');
        }
        other => {
            return Err(RunError::type_error(format!(
                "cannot serialize {} to json",
                other.type_name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_split_by_grammar() {
        assert!(matches!(parse_json("3").unwrap(), Value::Integer(3)));
        assert!(matches!(parse_json("3.5").unwrap(), Value::Float(_)));
        assert!(matches!(parse_json("1e3").unwrap(), Value::Float(_)));
        assert!(matches!(parse_json("-7").unwrap(), Value::Integer(-7)));
    }

    #[test]
    fn object_order_is_preserved() {
        let value = parse_json(r#"{"b": 1, "a": 2, "c": 3}"#).unwrap();
        let Value::Hash(map) = &value else { panic!("expected hash") };
        let keys: Vec<String> = map.borrow().keys().map(|k| k.to_value().inspect()).collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn round_trip() {
        let source = r#"{"name":"rush","tags":["a","b"],"count":3,"ratio":0.5,"ok":true,"none":null}"#;
        let value = parse_json(source).unwrap();
        assert_eq!(stringify(&value).unwrap(), source);
    }

    #[test]
    fn integral_float_stringifies_as_integer_token() {
        assert_eq!(stringify(&Value::Float(3.0)).unwrap(), "3");
        assert!(matches!(parse_json("3").unwrap(), Value::Integer(3)));
    }

    #[test]
    fn invalid_json_is_validation_error() {
        let err = parse_json("{\"a\": }").unwrap_err();
        match err {
            RunError::Exc(e) => assert!(e.message.starts_with("invalid json:")),
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[test]
    fn non_string_keys_fail_to_stringify() {
        let mut map = IndexMap::new();
        map.insert(HashKey::Integer(1), Value::Integer(2));
        let err = stringify(&Value::hash(map)).unwrap_err();
        match err {
            RunError::Exc(e) => assert_eq!(e.message, "json object keys must be STRING"),
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[test]
    fn string_escapes() {
        assert_eq!(parse_json(r#""a\nbA""#).unwrap().inspect(), "a\nbA");
        assert_eq!(stringify(&Value::string("a\"b")).unwrap(), r#""a\"b""#);
    }
}
