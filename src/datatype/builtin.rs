//! Built-in datatypes
//!
//! `Atom`, `String`, `Integer`, `Enum` and `IPv4`, plus the factories the
//! default registry wires up. Decoders are lenient about byte content
//! beyond their own grammar; encoders enforce the wire character set so
//! that a written file always lexes back.

use std::sync::Arc;

use super::{Datatype, DatatypeError, DecodeError, EncodeError, SyntaxKind, Value};
use crate::lex;
use crate::render;

/// Bytes legal in an atom token on the wire.
fn is_atom_byte(b: u8) -> bool {
    (0x21..=0x7e).contains(&b) && b != b'[' && b != b']'
}

/// Bytes legal inside a bracketed string on the wire. Like atoms, but
/// spaces are allowed.
fn is_string_byte(b: u8) -> bool {
    (0x20..=0x7e).contains(&b) && b != b'[' && b != b']'
}

/// Fail if a no-argument datatype declaration carries arguments.
fn reject_args(name: &str, args: &[u8]) -> Result<(), DatatypeError> {
    if args.iter().any(|b| !b.is_ascii_whitespace()) {
        return Err(DatatypeError::args(
            name,
            "declaration does not take arguments",
        ));
    }
    Ok(())
}

/// `Atom`: an uninterpreted token; the value is the token bytes.
#[derive(Debug)]
pub struct AtomDatatype;

impl Datatype for AtomDatatype {
    fn syntax(&self) -> SyntaxKind {
        SyntaxKind::Atom
    }

    fn decode(&self, token: &[u8]) -> Result<Value, DecodeError> {
        Ok(Value::Atom(token.to_vec()))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let Value::Atom(bytes) = value else {
            return Err(EncodeError::new("expected an Atom value"));
        };
        if bytes.is_empty() {
            return Err(EncodeError::new("atom token must not be empty"));
        }
        if let Some(b) = bytes.iter().find(|b| !is_atom_byte(**b)) {
            return Err(EncodeError::new(format!(
                "byte 0x{b:02x} not allowed in atom token"
            )));
        }
        Ok(bytes.clone())
    }
}

/// `String`: uninterpreted bytes carried in `[...]` on the wire.
#[derive(Debug)]
pub struct StringDatatype;

impl Datatype for StringDatatype {
    fn syntax(&self) -> SyntaxKind {
        SyntaxKind::String
    }

    fn decode(&self, token: &[u8]) -> Result<Value, DecodeError> {
        Ok(Value::String(token.to_vec()))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let Value::String(bytes) = value else {
            return Err(EncodeError::new("expected a String value"));
        };
        if let Some(b) = bytes.iter().find(|b| !is_string_byte(**b)) {
            return Err(EncodeError::new(format!(
                "byte 0x{b:02x} not allowed in string token"
            )));
        }
        Ok(bytes.clone())
    }
}

/// `Integer`: nonnegative decimal with no leading zero.
#[derive(Debug)]
pub struct IntegerDatatype;

impl Datatype for IntegerDatatype {
    fn syntax(&self) -> SyntaxKind {
        SyntaxKind::Atom
    }

    fn decode(&self, token: &[u8]) -> Result<Value, DecodeError> {
        match lex::integer(token, 0) {
            Ok((n, next)) if next == token.len() => Ok(Value::Int(n)),
            _ => Err(DecodeError::new(format!(
                "failed to parse \"{}\" as integer",
                render::lossy(token)
            ))),
        }
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let Value::Int(n) = value else {
            return Err(EncodeError::new("expected an Integer value"));
        };
        if *n == 0 {
            // The leading-digit rule leaves zero without a token form.
            return Err(EncodeError::new("integer 0 has no token form"));
        }
        Ok(n.to_string().into_bytes())
    }
}

/// `Enum V1 V2 ... Vn`: the token must equal one of the declared
/// variants; the value is the pair (zero-based index, token). When a
/// variant is declared twice the first declaration wins on decode.
#[derive(Debug)]
pub struct EnumDatatype {
    variants: Vec<Vec<u8>>,
}

impl EnumDatatype {
    pub fn new(variants: Vec<Vec<u8>>) -> Self {
        Self { variants }
    }

    pub fn variants(&self) -> &[Vec<u8>] {
        &self.variants
    }
}

impl Datatype for EnumDatatype {
    fn syntax(&self) -> SyntaxKind {
        SyntaxKind::Atom
    }

    fn decode(&self, token: &[u8]) -> Result<Value, DecodeError> {
        for (i, variant) in self.variants.iter().enumerate() {
            if variant == token {
                return Ok(Value::Enum(i, token.to_vec()));
            }
        }
        Err(DecodeError::new(format!(
            "invalid token \"{}\"; valid tokens are {}",
            render::lossy(token),
            render::lossy_join(self.variants.iter().map(|v| v.as_slice()))
        )))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let Value::Enum(_, token) = value else {
            return Err(EncodeError::new("expected an Enum value"));
        };
        if !self.variants.iter().any(|v| v == token) {
            return Err(EncodeError::new(format!(
                "\"{}\" is not a declared enum variant",
                render::lossy(token)
            )));
        }
        if token.iter().any(|b| !is_atom_byte(*b)) {
            return Err(EncodeError::new("enum variant contains invalid bytes"));
        }
        Ok(token.clone())
    }
}

/// `IPv4`: four dot-separated decimal octets; the value is the octets.
#[derive(Debug)]
pub struct Ipv4Datatype;

fn parse_octet(part: &[u8]) -> Option<u8> {
    if part.is_empty() {
        return None;
    }
    let mut v: u32 = 0;
    for b in part {
        if !b.is_ascii_digit() {
            return None;
        }
        v = v * 10 + u32::from(b - b'0');
        if v > 255 {
            return None;
        }
    }
    Some(v as u8)
}

impl Datatype for Ipv4Datatype {
    fn syntax(&self) -> SyntaxKind {
        SyntaxKind::Atom
    }

    fn decode(&self, token: &[u8]) -> Result<Value, DecodeError> {
        let parts: Vec<&[u8]> = token.split(|b| *b == b'.').collect();
        if parts.len() == 4 {
            if let (Some(a), Some(b), Some(c), Some(d)) = (
                parse_octet(parts[0]),
                parse_octet(parts[1]),
                parse_octet(parts[2]),
                parse_octet(parts[3]),
            ) {
                return Ok(Value::Ipv4([a, b, c, d]));
            }
        }
        Err(DecodeError::new(format!(
            "\"{}\" is not four dot-separated octets in 0..=255",
            render::lossy(token)
        )))
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let Value::Ipv4([a, b, c, d]) = value else {
            return Err(EncodeError::new("expected an IPv4 value"));
        };
        Ok(format!("{a}.{b}.{c}.{d}").into_bytes())
    }
}

pub fn atom_factory(args: &[u8]) -> Result<Arc<dyn Datatype>, DatatypeError> {
    reject_args("Atom", args)?;
    Ok(Arc::new(AtomDatatype))
}

pub fn string_factory(args: &[u8]) -> Result<Arc<dyn Datatype>, DatatypeError> {
    reject_args("String", args)?;
    Ok(Arc::new(StringDatatype))
}

pub fn integer_factory(args: &[u8]) -> Result<Arc<dyn Datatype>, DatatypeError> {
    reject_args("Integer", args)?;
    Ok(Arc::new(IntegerDatatype))
}

pub fn enum_factory(args: &[u8]) -> Result<Arc<dyn Datatype>, DatatypeError> {
    let variants = args
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_vec())
        .collect();
    Ok(Arc::new(EnumDatatype::new(variants)))
}

pub fn ipv4_factory(args: &[u8]) -> Result<Arc<dyn Datatype>, DatatypeError> {
    reject_args("IPv4", args)?;
    Ok(Arc::new(Ipv4Datatype))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_roundtrip() {
        let dt = AtomDatatype;
        let v = dt.decode(b"hello").unwrap();
        assert_eq!(v, Value::Atom(b"hello".to_vec()));
        assert_eq!(dt.encode(&v).unwrap(), b"hello");
    }

    #[test]
    fn test_atom_encode_rejects_bad_bytes() {
        let dt = AtomDatatype;
        for bad in [&b"a b"[..], b"a[b", b"a]b", b"", b"a\x7fb", b"caf\xc3\xa9"] {
            assert!(dt.encode(&Value::Atom(bad.to_vec())).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_atom_encode_rejects_wrong_variant() {
        assert!(AtomDatatype.encode(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_string_roundtrip_with_spaces() {
        let dt = StringDatatype;
        let v = dt.decode(b"hello world").unwrap();
        assert_eq!(dt.encode(&v).unwrap(), b"hello world");
    }

    #[test]
    fn test_string_empty_is_encodable() {
        let dt = StringDatatype;
        assert_eq!(dt.encode(&Value::String(Vec::new())).unwrap(), b"");
    }

    #[test]
    fn test_string_encode_rejects_brackets_and_controls() {
        let dt = StringDatatype;
        for bad in [&b"a]b"[..], b"a[b", b"a\nb", b"a\x7fb", b"\x1b"] {
            assert!(dt.encode(&Value::String(bad.to_vec())).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_integer_decode() {
        let dt = IntegerDatatype;
        assert_eq!(dt.decode(b"42").unwrap(), Value::Int(42));
        assert_eq!(dt.decode(b"1").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_integer_decode_rejects_zero_and_leading_zero() {
        let dt = IntegerDatatype;
        assert!(dt.decode(b"0").is_err());
        assert!(dt.decode(b"007").is_err());
    }

    #[test]
    fn test_integer_decode_rejects_garbage() {
        let dt = IntegerDatatype;
        assert!(dt.decode(b"12x").is_err());
        assert!(dt.decode(b"").is_err());
        assert!(dt.decode(b"-1").is_err());
    }

    #[test]
    fn test_integer_encode_roundtrip() {
        let dt = IntegerDatatype;
        let v = Value::Int(9000);
        assert_eq!(dt.decode(&dt.encode(&v).unwrap()).unwrap(), v);
    }

    #[test]
    fn test_integer_encode_rejects_zero() {
        assert!(IntegerDatatype.encode(&Value::Int(0)).is_err());
    }

    #[test]
    fn test_enum_first_match_wins() {
        let dt = EnumDatatype::new(vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]);
        assert_eq!(dt.decode(b"a").unwrap(), Value::Enum(0, b"a".to_vec()));
        assert_eq!(dt.decode(b"b").unwrap(), Value::Enum(1, b"b".to_vec()));
    }

    #[test]
    fn test_enum_invalid_token_lists_variants() {
        let dt = EnumDatatype::new(vec![b"male".to_vec(), b"female".to_vec()]);
        let err = dt.decode(b"other").unwrap_err();
        assert_eq!(
            err.message,
            "invalid token \"other\"; valid tokens are male female"
        );
    }

    #[test]
    fn test_enum_empty_decodes_nothing() {
        let dt = EnumDatatype::new(Vec::new());
        assert!(dt.decode(b"anything").is_err());
        assert!(dt.decode(b"").is_err());
    }

    #[test]
    fn test_enum_encode_checks_membership() {
        let dt = EnumDatatype::new(vec![b"on".to_vec(), b"off".to_vec()]);
        assert_eq!(dt.encode(&Value::Enum(1, b"off".to_vec())).unwrap(), b"off");
        assert!(dt.encode(&Value::Enum(0, b"maybe".to_vec())).is_err());
    }

    #[test]
    fn test_ipv4_decode() {
        let dt = Ipv4Datatype;
        assert_eq!(
            dt.decode(b"192.168.0.1").unwrap(),
            Value::Ipv4([192, 168, 0, 1])
        );
        // Leading zeros are tolerated on decode.
        assert_eq!(dt.decode(b"01.2.3.4").unwrap(), Value::Ipv4([1, 2, 3, 4]));
    }

    #[test]
    fn test_ipv4_decode_rejects_bad_addresses() {
        let dt = Ipv4Datatype;
        for bad in [&b"256.1.1.1"[..], b"1.2.3", b"1.2.3.4.5", b"a.b.c.d", b"1..2.3", b""] {
            assert!(dt.decode(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn test_ipv4_encode_is_canonical() {
        let dt = Ipv4Datatype;
        assert_eq!(dt.encode(&Value::Ipv4([10, 0, 0, 255])).unwrap(), b"10.0.0.255");
    }

    #[test]
    fn test_factories_reject_arguments() {
        assert!(atom_factory(b"x").is_err());
        assert!(string_factory(b"x").is_err());
        assert!(integer_factory(b"x").is_err());
        assert!(ipv4_factory(b"x").is_err());
        // Trailing whitespace is not an argument.
        assert!(atom_factory(b"  ").is_ok());
        assert!(atom_factory(b"").is_ok());
    }

    #[test]
    fn test_enum_factory_splits_variants() {
        let dt = enum_factory(b"  male   female ").unwrap();
        assert_eq!(dt.decode(b"female").unwrap(), Value::Enum(1, b"female".to_vec()));
    }
}
