use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use super::error::{StorageError, StorageResult};
use super::schema::{
    Attribute, DataType, FieldValue, Schema, MAX_ATTRIBUTES, MAX_ATTRIBUTE_NAME_LENGTH,
};

/// Byte length of the table header: attribute count, record count, record size.
pub const HEADER_SIZE: usize = 12;

/// Byte length of one attribute slot: flag, 64-byte name, type, size.
pub const ATTRIBUTE_SLOT_SIZE: usize = 4 + MAX_ATTRIBUTE_NAME_LENGTH + 4 + 4;

/// Flag plus size prefix in front of every record payload.
const RECORD_PREFIX_SIZE: usize = 8;

const EMPTY: i32 = 0;
const FILLED: i32 = 1;

/// The 12-byte prefix of every table file.
///
/// `record_count` counts INSERT operations ever performed on the table. It
/// is never decremented by deletes, which makes it a monotonic ID source for
/// the system tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub attribute_count: i32,
    pub record_count: i32,
    pub record_size: i32,
}

impl Header {
    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.attribute_count.to_ne_bytes());
        out[4..8].copy_from_slice(&self.record_count.to_ne_bytes());
        out[8..12].copy_from_slice(&self.record_size.to_ne_bytes());
        out
    }

    fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            attribute_count: read_i32(&bytes[0..4]),
            record_count: read_i32(&bytes[4..8]),
            record_size: read_i32(&bytes[8..12]),
        }
    }
}

/// One FILLED record slot returned by a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Zero-based slot position in the file
    pub slot: usize,
    pub payload: Vec<u8>,
}

fn read_i32(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    i32::from_ne_bytes(raw)
}

fn encode_attribute(attribute: &Attribute) -> [u8; ATTRIBUTE_SLOT_SIZE] {
    let mut out = [0u8; ATTRIBUTE_SLOT_SIZE];
    out[0..4].copy_from_slice(&FILLED.to_ne_bytes());
    let name = attribute.name.as_bytes();
    let n = name.len().min(MAX_ATTRIBUTE_NAME_LENGTH);
    out[4..4 + n].copy_from_slice(&name[..n]);
    let tail = 4 + MAX_ATTRIBUTE_NAME_LENGTH;
    out[tail..tail + 4].copy_from_slice(&attribute.data_type.code().to_ne_bytes());
    out[tail + 4..tail + 8].copy_from_slice(&(attribute.size as i32).to_ne_bytes());
    out
}

fn encode_slot(flag: i32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&flag.to_ne_bytes());
    out.extend_from_slice(&(payload.len() as i32).to_ne_bytes());
    out.extend_from_slice(payload);
    out
}

/// Fits a filter/assignment value to a column width (truncate or zero-pad).
fn fit(bytes: &[u8], size: usize) -> Vec<u8> {
    let mut out = vec![0u8; size];
    let n = bytes.len().min(size);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Reads the next whole slot into `buf`. A short trailing slot ends the scan.
fn read_slot<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Everything in front of the record slots, as read from disk.
struct Prelude {
    header: Header,
    schema: Schema,
    /// Raw header + attribute slot bytes
    raw: Vec<u8>,
}

impl Prelude {
    fn data_start(&self) -> u64 {
        self.raw.len() as u64
    }

    fn slot_size(&self) -> usize {
        RECORD_PREFIX_SIZE + self.schema.record_size()
    }

    /// Column offset and normalized comparison bytes for a filter.
    fn matcher(&self, filter: &FieldValue) -> StorageResult<(usize, Vec<u8>)> {
        let field = self.schema.field(&filter.attribute)?;
        Ok((
            RECORD_PREFIX_SIZE + field.offset,
            fit(&filter.bytes, field.attribute.size),
        ))
    }
}

fn slot_matches(slot: &[u8], matcher: Option<&(usize, Vec<u8>)>) -> bool {
    if read_i32(&slot[0..4]) != FILLED {
        return false;
    }
    match matcher {
        None => true,
        Some((offset, bytes)) => &slot[*offset..*offset + bytes.len()] == bytes.as_slice(),
    }
}

/// Single-owner handle for one table file.
///
/// The handle only knows its path; every operation opens the file, does its
/// seeks/reads/writes and closes it again. No descriptor outlives a call.
///
/// ## File Structure
/// ```text
/// <root>/<database>/<table>:
/// [attributeCount][recordCount][recordByteSize]      12-byte header
/// [flag][name: 64][type][size] x attributeCount      76-byte attribute slots
/// [flag][size][payload: recordByteSize] ...          record slots
/// ```
#[derive(Clone, Debug)]
pub struct TableFile {
    database: String,
    name: String,
    path: PathBuf,
}

impl TableFile {
    /// Points a handle at `<root>/<database>/<table>`. Names are expected to
    /// be validated and lowercased by the caller.
    pub fn new(root: &Path, database: &str, name: &str) -> Self {
        Self {
            database: database.to_string(),
            name: name.to_string(),
            path: root.join(database).join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn not_found(&self) -> StorageError {
        StorageError::TableNotFound {
            database: self.database.clone(),
            table: self.name.clone(),
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> StorageError {
        StorageError::Corrupt {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// A file that ends early is corrupt; any other read failure is I/O.
    fn short_read(&self, err: io::Error, reason: &str) -> StorageError {
        match err.kind() {
            ErrorKind::UnexpectedEof => self.corrupt(reason),
            _ => StorageError::from(err),
        }
    }

    fn open(&self, write: bool) -> StorageResult<File> {
        OpenOptions::new()
            .read(true)
            .write(write)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => self.not_found(),
                _ => StorageError::from(e),
            })
    }

    fn read_prelude<R: Read>(&self, reader: &mut R) -> StorageResult<Prelude> {
        let mut head = [0u8; HEADER_SIZE];
        reader
            .read_exact(&mut head)
            .map_err(|e| self.short_read(e, "truncated header"))?;
        let header = Header::from_bytes(&head);
        if header.attribute_count < 0 || header.attribute_count as usize > MAX_ATTRIBUTES {
            return Err(self.corrupt(format!("attribute count {}", header.attribute_count)));
        }

        let mut slots = vec![0u8; header.attribute_count as usize * ATTRIBUTE_SLOT_SIZE];
        reader
            .read_exact(&mut slots)
            .map_err(|e| self.short_read(e, "truncated attribute slots"))?;

        let mut attributes = Vec::with_capacity(header.attribute_count as usize);
        for slot in slots.chunks_exact(ATTRIBUTE_SLOT_SIZE) {
            if read_i32(&slot[0..4]) != FILLED {
                continue;
            }
            let name_bytes = &slot[4..4 + MAX_ATTRIBUTE_NAME_LENGTH];
            let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
            let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
            let tail = 4 + MAX_ATTRIBUTE_NAME_LENGTH;
            let code = read_i32(&slot[tail..tail + 4]);
            let data_type = DataType::from_code(code)
                .ok_or_else(|| self.corrupt(format!("unknown type code {code}")))?;
            let size = read_i32(&slot[tail + 4..tail + 8]);
            if size < 0 {
                return Err(self.corrupt(format!("negative size for {name}")));
            }
            attributes.push(Attribute::new(&name, data_type, size as usize));
        }

        let schema = Schema::new(attributes);
        if schema.record_size() as i64 != header.record_size as i64 {
            return Err(self.corrupt(format!(
                "record size {} does not match attributes ({})",
                header.record_size,
                schema.record_size()
            )));
        }

        let mut raw = head.to_vec();
        raw.extend_from_slice(&slots);
        Ok(Prelude { header, schema, raw })
    }

    /// Creates the table file with the given attributes.
    ///
    /// ## Validation
    /// - the file must not already exist
    /// - at most [`MAX_ATTRIBUTES`] attributes, at least one
    /// - attribute names must be unique (sorted, then adjacent names compared)
    ///
    /// ## Returns
    /// * `Ok(schema)` - the header and attribute slots were written
    /// * `Err(StorageError::TableExists)` - a file is already at the path
    /// * `Err(StorageError::DatabaseNotFound)` - the database directory is missing
    pub fn create(&self, attributes: &[Attribute]) -> StorageResult<Schema> {
        if attributes.is_empty() {
            return Err(StorageError::EmptySchema);
        }
        if attributes.len() > MAX_ATTRIBUTES {
            return Err(StorageError::TooManyAttributes {
                count: attributes.len(),
                limit: MAX_ATTRIBUTES,
            });
        }
        let mut names: Vec<&str> = attributes.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(StorageError::DuplicateAttribute(pair[0].to_string()));
        }

        let schema = Schema::new(attributes.to_vec());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::TableExists {
                    database: self.database.clone(),
                    table: self.name.clone(),
                },
                ErrorKind::NotFound => StorageError::DatabaseNotFound(self.database.clone()),
                _ => StorageError::from(e),
            })?;

        let header = Header {
            attribute_count: attributes.len() as i32,
            record_count: 0,
            record_size: schema.record_size() as i32,
        };
        let mut bytes = header.to_bytes().to_vec();
        for attribute in attributes {
            bytes.extend_from_slice(&encode_attribute(attribute));
        }
        file.write_all(&bytes)?;
        debug!(table = %self.path.display(), columns = attributes.len(), "created table file");
        Ok(schema)
    }

    /// Reads the attribute list and record layout.
    pub fn read_schema(&self) -> StorageResult<Schema> {
        let mut reader = BufReader::new(self.open(false)?);
        Ok(self.read_prelude(&mut reader)?.schema)
    }

    pub fn header(&self) -> StorageResult<Header> {
        let mut reader = BufReader::new(self.open(false)?);
        Ok(self.read_prelude(&mut reader)?.header)
    }

    /// Stores one record payload.
    ///
    /// Slots are scanned from the first one; the first EMPTY slot is reused,
    /// otherwise the record is appended. Only the affected slot and the
    /// header are rewritten, and `record_count` grows by one either way.
    ///
    /// ## Returns
    /// * `Ok(slot)` - zero-based slot position the record landed in
    pub fn insert(&self, payload: &[u8]) -> StorageResult<usize> {
        let mut file = self.open(true)?;
        let prelude = self.read_prelude(&mut file)?;
        if payload.len() != prelude.schema.record_size() {
            return Err(StorageError::RecordSize {
                expected: prelude.schema.record_size(),
                actual: payload.len(),
            });
        }

        let slot_size = prelude.slot_size();
        let mut buf = vec![0u8; slot_size];
        let mut slot = 0usize;
        {
            let mut reader = BufReader::new(&mut file);
            reader.seek(SeekFrom::Start(prelude.data_start()))?;
            while read_slot(&mut reader, &mut buf)? {
                if read_i32(&buf[0..4]) == EMPTY {
                    break;
                }
                slot += 1;
            }
        }

        let position = prelude.data_start() + (slot * slot_size) as u64;
        file.seek(SeekFrom::Start(position))?;
        file.write_all(&encode_slot(FILLED, payload))?;

        let header = Header {
            record_count: prelude.header.record_count.wrapping_add(1),
            ..prelude.header
        };
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        Ok(slot)
    }

    /// Sequential scan in file order.
    ///
    /// With a filter, only FILLED slots whose bytes at the filter column
    /// equal the filter value are returned. EMPTY slots never match.
    pub fn scan(&self, filter: Option<&FieldValue>) -> StorageResult<Vec<Record>> {
        let mut reader = BufReader::new(self.open(false)?);
        let prelude = self.read_prelude(&mut reader)?;
        let matcher = filter.map(|f| prelude.matcher(f)).transpose()?;

        let mut out = Vec::new();
        let mut buf = vec![0u8; prelude.slot_size()];
        let mut slot = 0usize;
        while read_slot(&mut reader, &mut buf)? {
            if slot_matches(&buf, matcher.as_ref()) {
                out.push(Record {
                    slot,
                    payload: buf[RECORD_PREFIX_SIZE..].to_vec(),
                });
            }
            slot += 1;
        }
        Ok(out)
    }

    /// Deletes records.
    ///
    /// - **With a filter**: matching FILLED slots are flagged EMPTY in place;
    ///   their bytes stay on disk and the slots become reusable by `insert`.
    /// - **Without a filter**: the file is truncated back to header and
    ///   attribute slots, dropping every row. The header is kept as is.
    ///
    /// ## Returns
    /// * `Ok(count)` - number of FILLED records removed
    pub fn delete(&self, filter: Option<&FieldValue>) -> StorageResult<usize> {
        let mut file = self.open(true)?;
        let prelude = self.read_prelude(&mut file)?;
        let matcher = filter.map(|f| prelude.matcher(f)).transpose()?;
        let slot_size = prelude.slot_size();
        let mut buf = vec![0u8; slot_size];
        let mut removed = 0usize;

        match matcher {
            Some(matcher) => {
                while read_slot(&mut file, &mut buf)? {
                    if slot_matches(&buf, Some(&matcher)) {
                        file.seek(SeekFrom::Current(-(slot_size as i64)))?;
                        file.write_all(&EMPTY.to_ne_bytes())?;
                        file.seek(SeekFrom::Current((slot_size - 4) as i64))?;
                        removed += 1;
                    }
                }
            }
            None => {
                {
                    let mut reader = BufReader::new(&mut file);
                    while read_slot(&mut reader, &mut buf)? {
                        if slot_matches(&buf, None) {
                            removed += 1;
                        }
                    }
                }
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&prelude.raw)?;
            }
        }
        Ok(removed)
    }

    /// Removes one column.
    ///
    /// The table is rebuilt into `<table> temp` next to the original: new
    /// header, remaining attribute slots, then every FILLED record with the
    /// column's bytes cut out. EMPTY slots are skipped, which compacts the
    /// file. The temp file is then renamed over the original.
    pub fn drop_column(&self, column: &str) -> StorageResult<Schema> {
        let mut reader = BufReader::new(self.open(false)?);
        let prelude = self.read_prelude(&mut reader)?;
        let (schema, removed) = prelude.schema.without(column)?;
        if schema.is_empty() {
            return Err(StorageError::EmptySchema);
        }

        let temp_path = self.path.with_file_name(format!("{} temp", self.name));
        let result = self.rebuild(&mut reader, &prelude, &schema, removed, &temp_path);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result?;
        fs::rename(&temp_path, &self.path)?;
        debug!(table = %self.path.display(), column, "dropped column");
        Ok(schema)
    }

    fn rebuild<R: Read>(
        &self,
        reader: &mut R,
        prelude: &Prelude,
        schema: &Schema,
        removed: std::ops::Range<usize>,
        temp_path: &Path,
    ) -> StorageResult<()> {
        let mut out = io::BufWriter::new(File::create(temp_path)?);
        let header = Header {
            attribute_count: schema.len() as i32,
            record_count: prelude.header.record_count,
            record_size: schema.record_size() as i32,
        };
        out.write_all(&header.to_bytes())?;
        for attribute in schema.attributes() {
            out.write_all(&encode_attribute(&attribute))?;
        }

        let mut buf = vec![0u8; prelude.slot_size()];
        let mut payload = Vec::with_capacity(schema.record_size());
        while read_slot(reader, &mut buf)? {
            if read_i32(&buf[0..4]) != FILLED {
                continue;
            }
            let old = &buf[RECORD_PREFIX_SIZE..];
            payload.clear();
            payload.extend_from_slice(&old[..removed.start]);
            payload.extend_from_slice(&old[removed.end..]);
            out.write_all(&encode_slot(FILLED, &payload))?;
        }
        out.flush()?;
        Ok(())
    }

    /// Rewrites one column of every matching record.
    ///
    /// Matching records are read, deleted with the same filter (no filter
    /// truncates the table) and re-inserted with the assigned column
    /// overwritten. Re-inserts reuse the freed slots first-fit and advance
    /// `record_count` like any insert.
    ///
    /// ## Returns
    /// * `Ok(count)` - records rewritten
    /// * `Err(StorageError::TableNotFound | AttributeNotFound)` - nothing was changed
    pub fn update(&self, set: &FieldValue, filter: Option<&FieldValue>) -> StorageResult<usize> {
        let schema = self.read_schema()?;
        let target = schema.field(&set.attribute)?.clone();
        if let Some(filter) = filter {
            schema.field(&filter.attribute)?;
        }

        let records = self.scan(filter)?;
        self.delete(filter)?;
        let value = fit(&set.bytes, target.attribute.size);
        for mut record in records.iter().cloned() {
            record.payload[target.range()].copy_from_slice(&value);
            self.insert(&record.payload)?;
        }
        Ok(records.len())
    }

    /// Deletes the table file.
    pub fn remove(&self) -> StorageResult<()> {
        fs::remove_file(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => self.not_found(),
            _ => StorageError::from(e),
        })
    }
}

/// Creates a database directory under `root`.
///
/// ## Returns
/// * `Ok(true)` - directory created
/// * `Ok(false)` - it already existed, nothing done
pub fn create_database(root: &Path, name: &str) -> StorageResult<bool> {
    match fs::create_dir(root.join(name)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Removes a database directory and every table file in it.
pub fn remove_database(root: &Path, name: &str) -> StorageResult<()> {
    fs::remove_dir_all(root.join(name)).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StorageError::DatabaseNotFound(name.to_string()),
        _ => StorageError::from(e),
    })
}
