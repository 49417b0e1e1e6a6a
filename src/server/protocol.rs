//! Fixed-size frame codec.
//!
//! Every message in either direction is exactly [`FRAME_SIZE`] bytes, zero
//! padded. There is no length prefix; text content ends at the first zero
//! byte.

use crate::engine::{ResultSet, Value, MAX_CREDENTIAL_LENGTH};

/// Size of every frame on the wire.
pub const FRAME_SIZE: usize = 4096;

/// Largest value chunk carried by one `'V'` frame (frame minus tag byte).
pub const VALUE_CHUNK_SIZE: usize = FRAME_SIZE - 1;

pub type Frame = [u8; FRAME_SIZE];

/// Superuser bootstrap literal.
pub const ROOT_LITERAL: &[u8] = b"root";
pub const LOGIN_SUCCESS: &[u8] = b"success";
pub const LOGIN_FAILED: &[u8] = b"failed";

pub const TAG_LOGIN: u8 = b'L';
pub const TAG_MESSAGE: u8 = b'M';
pub const TAG_QUERY: u8 = b'Q';
pub const TAG_VALUE: u8 = b'V';
pub const TAG_COLUMN_END: u8 = b'C';
pub const TAG_ROW_END: u8 = b'R';
pub const TAG_FINISHED: u8 = b'F';

/// Offset of the credential bytes in a login frame: tag + two i32 lengths.
const LOGIN_HEADER_SIZE: usize = 1 + 4 + 4;

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `"root"`: become the superuser, no reply
    Root,
    /// `'L'` + i32 username length + i32 password length + bytes
    Login { username: Vec<u8>, password: Vec<u8> },
    /// Anything else: one script line
    Script(String),
    /// A login frame with impossible lengths or a non UTF-8 script
    Malformed,
}

impl Request {
    pub fn decode(frame: &Frame) -> Request {
        if frame[0] == TAG_LOGIN {
            return decode_login(frame).unwrap_or(Request::Malformed);
        }
        let content = text(frame);
        if content == ROOT_LITERAL {
            return Request::Root;
        }
        match std::str::from_utf8(content) {
            Ok(line) => Request::Script(line.to_string()),
            Err(_) => Request::Malformed,
        }
    }

    /// Client side encoding. Oversized content is truncated to the frame.
    pub fn encode(&self) -> Frame {
        match self {
            Request::Root => text_frame(ROOT_LITERAL),
            Request::Login { username, password } => {
                let mut frame = [0u8; FRAME_SIZE];
                frame[0] = TAG_LOGIN;
                frame[1..5].copy_from_slice(&(username.len() as i32).to_ne_bytes());
                frame[5..9].copy_from_slice(&(password.len() as i32).to_ne_bytes());
                let body = [username.as_slice(), password.as_slice()].concat();
                let n = body.len().min(FRAME_SIZE - LOGIN_HEADER_SIZE);
                frame[LOGIN_HEADER_SIZE..LOGIN_HEADER_SIZE + n].copy_from_slice(&body[..n]);
                frame
            }
            Request::Script(line) => text_frame(line.as_bytes()),
            Request::Malformed => [0u8; FRAME_SIZE],
        }
    }
}

fn decode_login(frame: &Frame) -> Option<Request> {
    let length = |at: usize| {
        let len = i32::from_ne_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]]);
        usize::try_from(len).ok().filter(|&n| n <= MAX_CREDENTIAL_LENGTH)
    };
    let ulen = length(1)?;
    let plen = length(5)?;
    let user_end = LOGIN_HEADER_SIZE + ulen;
    Some(Request::Login {
        username: frame[LOGIN_HEADER_SIZE..user_end].to_vec(),
        password: frame[user_end..user_end + plen].to_vec(),
    })
}

/// Bytes of a frame up to the first zero byte.
pub fn text(frame: &Frame) -> &[u8] {
    let end = frame.iter().position(|&b| b == 0).unwrap_or(FRAME_SIZE);
    &frame[..end]
}

/// A zero padded frame holding `bytes`, truncated to the frame size.
pub fn text_frame(bytes: &[u8]) -> Frame {
    let mut frame = [0u8; FRAME_SIZE];
    let n = bytes.len().min(FRAME_SIZE);
    frame[..n].copy_from_slice(&bytes[..n]);
    frame
}

fn tagged_frame(tag: u8, bytes: &[u8]) -> Frame {
    let mut frame = [0u8; FRAME_SIZE];
    frame[0] = tag;
    let n = bytes.len().min(VALUE_CHUNK_SIZE);
    frame[1..1 + n].copy_from_slice(&bytes[..n]);
    frame
}

fn int_frame(value: i32) -> Frame {
    let mut frame = [0u8; FRAME_SIZE];
    frame[..4].copy_from_slice(&value.to_ne_bytes());
    frame
}

/// `'M'` + status text.
pub fn message_frame(text: &str) -> Frame {
    tagged_frame(TAG_MESSAGE, text.as_bytes())
}

pub fn login_result(success: bool) -> Frame {
    text_frame(if success { LOGIN_SUCCESS } else { LOGIN_FAILED })
}

/// Encodes a SELECT result with the multi-frame row protocol.
///
/// ```text
/// 'Q'
/// i32 column count
/// column name            × columns
/// i32 row count
/// ┌ 'V' chunk ... 'C'    × columns
/// └ 'R'                  × rows
/// 'F'
/// ```
/// A value longer than [`VALUE_CHUNK_SIZE`] bytes spans several `'V'`
/// frames; an empty value still gets one.
pub fn select_frames(result: &ResultSet) -> Vec<Frame> {
    let mut frames = vec![tagged_frame(TAG_QUERY, &[]), int_frame(result.columns.len() as i32)];
    frames.extend(result.columns.iter().map(|name| text_frame(name.as_bytes())));
    frames.push(int_frame(result.rows.len() as i32));
    for row in &result.rows {
        for value in row {
            let bytes = value_bytes(value);
            if bytes.is_empty() {
                frames.push(tagged_frame(TAG_VALUE, &[]));
            }
            frames.extend(bytes.chunks(VALUE_CHUNK_SIZE).map(|c| tagged_frame(TAG_VALUE, c)));
            frames.push(tagged_frame(TAG_COLUMN_END, &[]));
        }
        frames.push(tagged_frame(TAG_ROW_END, &[]));
    }
    frames.push(tagged_frame(TAG_FINISHED, &[]));
    frames
}

/// Text sent for one value: numbers in decimal, text as stored.
fn value_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Text(bytes) => bytes.clone(),
        other => other.to_string().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_root_login_and_scripts() {
        assert_eq!(Request::decode(&text_frame(b"root")), Request::Root);
        assert_eq!(
            Request::decode(&text_frame(b"rooted")),
            Request::Script("rooted".into())
        );
        assert_eq!(
            Request::decode(&text_frame(b"USE shop;")),
            Request::Script("USE shop;".into())
        );

        let login = Request::Login {
            username: b"alice".to_vec(),
            password: b"pw".to_vec(),
        };
        assert_eq!(Request::decode(&login.encode()), login);
    }

    #[test]
    fn bad_login_lengths_are_malformed() {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = TAG_LOGIN;
        frame[1..5].copy_from_slice(&(-1i32).to_ne_bytes());
        assert_eq!(Request::decode(&frame), Request::Malformed);

        frame[1..5].copy_from_slice(&65i32.to_ne_bytes());
        assert_eq!(Request::decode(&frame), Request::Malformed);
    }

    #[test]
    fn invalid_utf8_script_is_malformed() {
        assert_eq!(Request::decode(&text_frame(&[b'S', 0xff, 0xfe])), Request::Malformed);
    }

    #[test]
    fn message_is_tagged_and_truncated() {
        let frame = message_frame("Table created");
        assert_eq!(text(&frame), b"MTable created");
        let long = "x".repeat(FRAME_SIZE * 2);
        assert_eq!(text(&message_frame(&long)).len(), FRAME_SIZE);
    }

    #[test]
    fn select_frame_sequence() {
        let result = ResultSet {
            columns: vec!["id".into(), "name".into()],
            rows: vec![vec![Value::Int(1), Value::Text(b"alice".to_vec())]],
        };
        let frames = select_frames(&result);
        let tags: Vec<u8> = frames.iter().map(|f| f[0]).collect();

        assert_eq!(frames.len(), 1 + 1 + 2 + 1 + 2 + 2 + 1 + 1);
        assert_eq!(tags[0], b'Q');
        assert_eq!(i32::from_ne_bytes(frames[1][..4].try_into().unwrap()), 2);
        assert_eq!(text(&frames[2]), b"id");
        assert_eq!(text(&frames[3]), b"name");
        assert_eq!(i32::from_ne_bytes(frames[4][..4].try_into().unwrap()), 1);
        assert_eq!(text(&frames[5]), b"V1");
        assert_eq!(tags[6], b'C');
        assert_eq!(text(&frames[7]), b"Valice");
        assert_eq!(&tags[8..], b"CRF");
    }

    #[test]
    fn long_values_span_several_frames() {
        let value = vec![b'a'; VALUE_CHUNK_SIZE + 10];
        let result = ResultSet {
            columns: vec!["body".into()],
            rows: vec![vec![Value::Text(value)]],
        };
        let frames = select_frames(&result);
        let values: Vec<&Frame> = frames.iter().filter(|f| f[0] == TAG_VALUE).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(text(values[0]).len(), FRAME_SIZE);
        assert_eq!(text(values[1]).len(), 11);
    }

    #[test]
    fn empty_value_still_sends_one_value_frame() {
        let result = ResultSet {
            columns: vec!["name".into()],
            rows: vec![vec![Value::Text(Vec::new())]],
        };
        let tags: Vec<u8> = select_frames(&result)[4..].iter().map(|f| f[0]).collect();
        assert_eq!(tags, b"VCRF");
    }
}
