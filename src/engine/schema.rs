use std::fmt;
use std::ops::Range;

use super::error::{StorageError, StorageResult};

/// Longest attribute, table or database name, in bytes.
pub const MAX_ATTRIBUTE_NAME_LENGTH: usize = 64;

/// Upper bound on attributes per table.
pub const MAX_ATTRIBUTES: usize = 128;

/// Size of a STRING column declared without `(N)`, and the cap for `STRING(N)`.
pub const STRING_MAX_LENGTH: usize = 655_356;

/// Column data types, with the on-disk discriminants of the table format.
///
/// ## Type Mapping
/// - `Int` ↔ 4-byte native integer
/// - `Long` ↔ 8-byte native integer
/// - `Decimal` ↔ 8-byte float
/// - `String`, `Time`, `Date`, `DateTime` ↔ fixed-width zero-padded bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DataType {
    Int = 1,
    Long = 2,
    Decimal = 3,
    String = 4,
    Time = 5,
    Date = 6,
    DateTime = 7,
}

impl DataType {
    /// Decodes the on-disk discriminant.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Int),
            2 => Some(Self::Long),
            3 => Some(Self::Decimal),
            4 => Some(Self::String),
            5 => Some(Self::Time),
            6 => Some(Self::Date),
            7 => Some(Self::DateTime),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Parses a type declaration from a CREATE TABLE list.
    ///
    /// Keywords are case-insensitive. `STRING(N)` sets the width explicitly
    /// and is capped at [`STRING_MAX_LENGTH`]; every other type has a fixed
    /// width.
    ///
    /// ## Returns
    /// * `Ok((type, byte_size))`
    /// * `Err(StorageError::InvalidType)` - unknown keyword or bad length
    pub fn parse_declaration(decl: &str) -> StorageResult<(Self, usize)> {
        let upper = decl.trim().to_ascii_uppercase();
        let fixed = match upper.as_str() {
            "INT" => Some((Self::Int, 4)),
            "LONG" => Some((Self::Long, 8)),
            "DECIMAL" => Some((Self::Decimal, 8)),
            "STRING" => Some((Self::String, STRING_MAX_LENGTH)),
            "TIME" => Some((Self::Time, 5)),
            "DATE" => Some((Self::Date, 10)),
            "DATETIME" => Some((Self::DateTime, 16)),
            _ => None,
        };
        if let Some(parsed) = fixed {
            return Ok(parsed);
        }

        let invalid = || StorageError::InvalidType(decl.trim().to_string());
        let length = upper
            .strip_prefix("STRING(")
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let size: usize = length.trim().parse().map_err(|_| invalid())?;
        if size == 0 {
            return Err(invalid());
        }
        Ok((Self::String, size.min(STRING_MAX_LENGTH)))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "INT",
            Self::Long => "LONG",
            Self::Decimal => "DECIMAL",
            Self::String => "STRING",
            Self::Time => "TIME",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
        };
        f.write_str(name)
    }
}

/// Validates a database, table or column name and returns it lowercased.
///
/// Names must be non-empty, ASCII alphanumeric and fit the 64-byte name
/// field of the table format.
pub fn identifier(name: &str) -> StorageResult<String> {
    if name.is_empty()
        || name.len() > MAX_ATTRIBUTE_NAME_LENGTH
        || !name.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(name.to_ascii_lowercase())
}

/// Definition of a single named, typed, fixed-width column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    /// Lowercased column name
    pub name: String,
    pub data_type: DataType,
    /// Width of the column inside a record payload
    pub size: usize,
}

impl Attribute {
    pub fn new(name: &str, data_type: DataType, size: usize) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            data_type,
            size,
        }
    }

    /// Parses a CREATE TABLE attribute list such as
    /// `id INT, name STRING(10), born DATE`.
    ///
    /// Names are validated with [`identifier`] and lowercased. Uniqueness
    /// and the attribute limit are checked when the table is created, not
    /// here.
    pub fn parse_list(definition: &str) -> StorageResult<Vec<Attribute>> {
        let mut attributes = Vec::new();
        for part in definition.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut words = part.split_whitespace();
            let name = words.next().unwrap_or_default();
            let declaration: String = words.collect();
            if declaration.is_empty() {
                return Err(StorageError::InvalidType(part.to_string()));
            }
            let name = identifier(name)?;
            let (data_type, size) = DataType::parse_declaration(&declaration)?;
            attributes.push(Attribute { name, data_type, size });
        }
        if attributes.is_empty() {
            return Err(StorageError::EmptySchema);
        }
        Ok(attributes)
    }
}

/// A typed column value decoded from (or destined for) a record payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Decimal(f64),
    /// Text bytes without the zero padding
    Text(Vec<u8>),
}

impl Value {
    /// Parses a script literal according to the attribute's declared type.
    ///
    /// Surrounding single quotes are removed first. Numeric types must parse
    /// completely; text types are taken verbatim and truncated later when
    /// encoded.
    pub fn parse(literal: &str, attribute: &Attribute) -> StorageResult<Value> {
        let raw = unquote(literal);
        let invalid = || StorageError::InvalidValue {
            literal: literal.to_string(),
            data_type: attribute.data_type,
        };
        let value = match attribute.data_type {
            DataType::Int => Value::Int(raw.trim().parse().map_err(|_| invalid())?),
            DataType::Long => Value::Long(raw.trim().parse().map_err(|_| invalid())?),
            DataType::Decimal => Value::Decimal(raw.trim().parse().map_err(|_| invalid())?),
            _ => Value::Text(raw.as_bytes().to_vec()),
        };
        Ok(value)
    }

    /// Writes the fixed-width encoding into `buf`, which is exactly the
    /// attribute's width. Text is truncated or zero-padded to fit.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf.fill(0);
        let bytes: Vec<u8> = match self {
            Value::Int(v) => v.to_ne_bytes().to_vec(),
            Value::Long(v) => v.to_ne_bytes().to_vec(),
            Value::Decimal(v) => v.to_ne_bytes().to_vec(),
            Value::Text(v) => v.clone(),
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
    }

    /// Decodes one attribute's bytes out of a payload slice.
    pub fn decode(attribute: &Attribute, bytes: &[u8]) -> Value {
        match attribute.data_type {
            DataType::Int => Value::Int(i32::from_ne_bytes(fixed(bytes))),
            DataType::Long => Value::Long(i64::from_ne_bytes(fixed(bytes))),
            DataType::Decimal => Value::Decimal(f64::from_ne_bytes(fixed(bytes))),
            _ => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::Text(bytes[..end].to_vec())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(&String::from_utf8_lossy(v)),
        }
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Strips one pair of surrounding single quotes, if present.
pub fn unquote(literal: &str) -> &str {
    let trimmed = literal.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// An attribute together with its byte offset inside the record payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub attribute: Attribute,
    pub offset: usize,
}

impl Field {
    /// Byte range of this field within a payload.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.attribute.size
    }
}

/// A column name paired with a value already encoded to that column's width.
///
/// Used both as an equality filter (`WHERE col = value`) and as an
/// assignment (`SET col = value`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldValue {
    pub attribute: String,
    pub bytes: Vec<u8>,
}

/// Schema-driven record codec.
///
/// Offsets are computed once from the ordered attribute list; every encode
/// and decode goes through the resulting [`Field`] descriptors.
///
/// ## Record Layout
/// ```text
/// payload: [attr0 bytes][attr1 bytes]...[attrN bytes]
///           ^offset 0    ^size0         ^sum of previous sizes
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
    record_size: usize,
}

impl Schema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        let mut offset = 0;
        let fields = attributes
            .into_iter()
            .map(|attribute| {
                let field = Field { offset, attribute };
                offset += field.attribute.size;
                field
            })
            .collect();
        Self {
            fields,
            record_size: offset,
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn attributes(&self) -> Vec<Attribute> {
        self.fields.iter().map(|f| f.attribute.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sum of all attribute widths.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Looks a field up by (case-insensitive) name.
    pub fn field(&self, name: &str) -> StorageResult<&Field> {
        self.fields
            .iter()
            .find(|f| f.attribute.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StorageError::AttributeNotFound(name.to_ascii_lowercase()))
    }

    /// Encodes a literal for the named column.
    pub fn field_value(&self, name: &str, literal: &str) -> StorageResult<FieldValue> {
        let field = self.field(name)?;
        let mut bytes = vec![0u8; field.attribute.size];
        Value::parse(literal, &field.attribute)?.encode_into(&mut bytes);
        Ok(FieldValue {
            attribute: field.attribute.name.clone(),
            bytes,
        })
    }

    /// Builds a full payload from positional INSERT literals.
    ///
    /// The whole buffer is built before anything touches the disk, so a
    /// malformed literal aborts the statement with no partial row. Columns
    /// without a literal stay zero-filled.
    pub fn encode_literals<S: AsRef<str>>(&self, literals: &[S]) -> StorageResult<Vec<u8>> {
        if literals.len() > self.fields.len() {
            return Err(StorageError::TooManyValues {
                given: literals.len(),
                expected: self.fields.len(),
            });
        }
        let mut payload = vec![0u8; self.record_size];
        for (field, literal) in self.fields.iter().zip(literals) {
            Value::parse(literal.as_ref(), &field.attribute)?
                .encode_into(&mut payload[field.range()]);
        }
        Ok(payload)
    }

    pub fn encode_record(&self, values: &[Value]) -> Vec<u8> {
        let mut payload = vec![0u8; self.record_size];
        for (field, value) in self.fields.iter().zip(values) {
            value.encode_into(&mut payload[field.range()]);
        }
        payload
    }

    pub fn decode_record(&self, payload: &[u8]) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| Value::decode(&f.attribute, &payload[f.range()]))
            .collect()
    }

    /// The schema with one column removed, plus that column's byte range in
    /// the old payload layout.
    pub fn without(&self, name: &str) -> StorageResult<(Schema, Range<usize>)> {
        let removed = self.field(name)?.clone();
        let remaining = self
            .fields
            .iter()
            .filter(|f| f.attribute.name != removed.attribute.name)
            .map(|f| f.attribute.clone())
            .collect();
        Ok((Schema::new(remaining), removed.range()))
    }
}
