/// Parser for the specification type grammar.
///
/// ```text
/// type   := scalar | composite | custom
/// scalar := [pt:]bytes | [pt:]str | [pt:]int | [pt:]float | [pt:]bool
/// composite := [pt:]optional[type] | [pt:]union[type, ...]
///            | [pt:]set[type] | [pt:]list[type] | [pt:]dict[type, type]
/// custom := ct:Name
/// ```
///
/// Custom names resolve against the already-declared struct types.
use std::collections::BTreeMap;

use crate::error::SpecError;
use crate::fields::{FieldType, ScalarType, StructType};

/// Struct types declared by a specification, by name.
pub type CustomTypes = BTreeMap<String, StructType>;

/// Parse and check a type string.
pub fn parse_type(src: &str, custom: &CustomTypes) -> Result<FieldType, SpecError> {
    let mut parser = TypeParser {
        src,
        pos: 0,
        custom,
    };
    let ty = parser.parse().map_err(|reason| invalid(src, reason))?;
    parser.skip_ws();
    if parser.pos != src.len() {
        return Err(invalid(
            src,
            format!("unexpected `{}`", &src[parser.pos..]),
        ));
    }
    ty.check().map_err(|reason| invalid(src, reason))?;
    Ok(ty)
}

fn invalid(src: &str, reason: String) -> SpecError {
    SpecError::InvalidType {
        ty: src.to_string(),
        reason,
    }
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
    custom: &'a CustomTypes,
}

impl<'a> TypeParser<'a> {
    fn parse(&mut self) -> Result<FieldType, String> {
        self.skip_ws();
        if self.eat("ct:") {
            let name = self.ident();
            return self
                .custom
                .get(name)
                .cloned()
                .map(FieldType::Struct)
                .ok_or_else(|| format!("unknown custom type `ct:{name}`"));
        }
        self.eat("pt:");
        let name = self.ident();
        let ty = match name {
            "bytes" => FieldType::Scalar(ScalarType::Bytes),
            "str" => FieldType::Scalar(ScalarType::Str),
            "int" => FieldType::Scalar(ScalarType::Int),
            "float" => FieldType::Scalar(ScalarType::Float),
            "bool" => FieldType::Scalar(ScalarType::Bool),
            "optional" => FieldType::optional(self.single_arg()?),
            "set" => FieldType::set(self.single_arg()?),
            "list" => FieldType::list(self.single_arg()?),
            "dict" => {
                let mut args = self.args()?;
                if args.len() != 2 {
                    return Err(format!("dict takes 2 arguments, found {}", args.len()));
                }
                let value = args.pop().ok_or("dict value missing")?;
                let key = args.pop().ok_or("dict key missing")?;
                FieldType::dict(key, value)
            }
            "union" => FieldType::Union(self.args()?),
            "" => return Err(format!("expected a type at offset {}", self.pos)),
            other => return Err(format!("unknown type `{other}`")),
        };
        Ok(ty)
    }

    fn single_arg(&mut self) -> Result<FieldType, String> {
        let mut args = self.args()?;
        match args.len() {
            1 => args.pop().ok_or_else(|| "missing argument".to_string()),
            n => Err(format!("expected 1 argument, found {n}")),
        }
    }

    /// `[type (, type)*]`
    fn args(&mut self) -> Result<Vec<FieldType>, String> {
        self.skip_ws();
        if !self.eat("[") {
            return Err(format!("expected `[` at offset {}", self.pos));
        }
        let mut args = vec![self.parse()?];
        loop {
            self.skip_ws();
            if self.eat(",") {
                args.push(self.parse()?);
            } else if self.eat("]") {
                return Ok(args);
            } else {
                return Err(format!("expected `,` or `]` at offset {}", self.pos));
            }
        }
    }

    fn ident(&mut self) -> &'a str {
        let src = self.src;
        let start = self.pos;
        let len = src[start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(src.len() - start);
        self.pos += len;
        &src[start..self.pos]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }
}
