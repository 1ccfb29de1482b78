//! Backend (server → client) messages.
//!
//! Incoming messages are decoded into the [`BackendMessage`] sum type so that
//! consumers dispatch with an exhaustive match instead of re-checking raw type
//! bytes at every step.

use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, ErrorFields, Result};
use crate::row::Column;

use super::codec::{read_cstr, read_u32};
use super::types::{I16BE, I32BE, TransactionStatus, U16BE, U32BE};

/// Backend message type bytes.
pub mod msg_type {
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// CloseComplete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// ParameterDescription
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// NoData
    pub const NO_DATA: u8 = b'n';
    /// PortalSuspended
    pub const PORTAL_SUSPENDED: u8 = b's';
}

/// Error field type codes.
mod field_type {
    pub const SEVERITY: u8 = b'S';
    pub const CODE: u8 = b'C';
    pub const MESSAGE: u8 = b'M';
    pub const DETAIL: u8 = b'D';
    pub const HINT: u8 = b'H';
    pub const POSITION: u8 = b'P';
    pub const INTERNAL_QUERY: u8 = b'q';
    pub const WHERE: u8 = b'W';
    pub const FILE: u8 = b'F';
    pub const LINE: u8 = b'L';
    pub const ROUTINE: u8 = b'R';
}

/// A decoded backend message.
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Portal is bound and ready to execute.
    BindComplete,
    /// Close request acknowledged.
    CloseComplete,
    /// Statement parsed.
    ParseComplete,
    /// Statement produces no rows.
    NoData,
    /// Execute stopped at the requested row limit; more rows remain.
    PortalSuspended,
    /// Parameter type OIDs of a described statement.
    ParameterDescription(Vec<u32>),
    /// Column metadata for the upcoming rows.
    RowDescription(Vec<Column>),
    /// One row of data; `None` cells are SQL NULL.
    DataRow(Vec<Option<Vec<u8>>>),
    /// Command finished; carries the command tag (e.g. "SELECT 3").
    CommandComplete(String),
    /// The query string was empty.
    EmptyQueryResponse,
    /// Server error.
    ErrorResponse(ErrorFields),
    /// Non-fatal notice.
    NoticeResponse(ErrorFields),
    /// Run-time parameter changed.
    ParameterStatus {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
    /// Server is ready for the next cycle.
    ReadyForQuery(TransactionStatus),
}

impl BackendMessage {
    /// Decode a message from its type byte and payload.
    pub fn decode(type_byte: u8, payload: &[u8]) -> Result<Self> {
        match type_byte {
            msg_type::BIND_COMPLETE => Ok(Self::BindComplete),
            msg_type::CLOSE_COMPLETE => Ok(Self::CloseComplete),
            msg_type::PARSE_COMPLETE => Ok(Self::ParseComplete),
            msg_type::NO_DATA => Ok(Self::NoData),
            msg_type::PORTAL_SUSPENDED => Ok(Self::PortalSuspended),
            msg_type::EMPTY_QUERY_RESPONSE => Ok(Self::EmptyQueryResponse),
            msg_type::PARAMETER_DESCRIPTION => parse_parameter_description(payload),
            msg_type::ROW_DESCRIPTION => parse_row_description(payload),
            msg_type::DATA_ROW => parse_data_row(payload),
            msg_type::COMMAND_COMPLETE => {
                let (tag, _) = read_cstr(payload)?;
                Ok(Self::CommandComplete(tag.to_string()))
            }
            msg_type::ERROR_RESPONSE => Ok(Self::ErrorResponse(parse_fields(payload)?)),
            msg_type::NOTICE_RESPONSE => Ok(Self::NoticeResponse(parse_fields(payload)?)),
            msg_type::PARAMETER_STATUS => {
                let (name, rest) = read_cstr(payload)?;
                let (value, _) = read_cstr(rest)?;
                Ok(Self::ParameterStatus {
                    name: name.to_string(),
                    value: value.to_string(),
                })
            }
            msg_type::READY_FOR_QUERY => {
                let status = payload
                    .first()
                    .copied()
                    .and_then(TransactionStatus::from_byte)
                    .unwrap_or_default();
                Ok(Self::ReadyForQuery(status))
            }
            other => Err(Error::Protocol(format!(
                "unknown backend message type: '{}'",
                other as char
            ))),
        }
    }
}

/// RowDescription message header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct RowDescriptionHead {
    num_fields: U16BE,
}

/// Fixed-size tail of a field description (18 bytes).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct FieldDescriptionTail {
    table_oid: U32BE,
    column_id: I16BE,
    type_oid: U32BE,
    type_size: I16BE,
    type_modifier: I32BE,
    format: U16BE,
}

fn parse_row_description(payload: &[u8]) -> Result<BackendMessage> {
    if payload.len() < 2 {
        return Err(Error::Protocol("RowDescription: truncated header".into()));
    }
    let head = RowDescriptionHead::ref_from_bytes(&payload[..2])
        .map_err(|e| Error::Protocol(format!("RowDescription header: {e:?}")))?;

    let num_fields = head.num_fields.get() as usize;
    let mut columns = Vec::with_capacity(num_fields);
    let mut data = &payload[2..];

    const TAIL_SIZE: usize = size_of::<FieldDescriptionTail>();

    for _ in 0..num_fields {
        let (name, rest) = read_cstr(data)?;
        if rest.len() < TAIL_SIZE {
            return Err(Error::Protocol("RowDescription: truncated field".into()));
        }
        let tail = FieldDescriptionTail::ref_from_bytes(&rest[..TAIL_SIZE])
            .map_err(|e| Error::Protocol(format!("FieldDescription tail: {e:?}")))?;

        columns.push(Column {
            name: name.to_string(),
            table_oid: tail.table_oid.get(),
            column_id: tail.column_id.get(),
            type_oid: tail.type_oid.get(),
            type_size: tail.type_size.get(),
            type_modifier: tail.type_modifier.get(),
            format: tail.format.get().into(),
        });

        data = &rest[TAIL_SIZE..];
    }

    Ok(BackendMessage::RowDescription(columns))
}

fn parse_data_row(payload: &[u8]) -> Result<BackendMessage> {
    if payload.len() < 2 {
        return Err(Error::Protocol("DataRow: truncated header".into()));
    }
    let head = U16BE::ref_from_bytes(&payload[..2])
        .map_err(|e| Error::Protocol(format!("DataRow header: {e:?}")))?;

    let num_columns = head.get() as usize;
    let mut values = Vec::with_capacity(num_columns);
    let mut data = &payload[2..];

    for _ in 0..num_columns {
        if data.len() < 4 {
            return Err(Error::Protocol("DataRow: truncated cell length".into()));
        }
        let len = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        data = &data[4..];

        if len == -1 {
            values.push(None);
        } else {
            let len = len as usize;
            if data.len() < len {
                return Err(Error::Protocol("DataRow: truncated cell value".into()));
            }
            values.push(Some(data[..len].to_vec()));
            data = &data[len..];
        }
    }

    Ok(BackendMessage::DataRow(values))
}

fn parse_parameter_description(payload: &[u8]) -> Result<BackendMessage> {
    if payload.len() < 2 {
        return Err(Error::Protocol(
            "ParameterDescription: truncated header".into(),
        ));
    }
    let head = U16BE::ref_from_bytes(&payload[..2])
        .map_err(|e| Error::Protocol(format!("ParameterDescription header: {e:?}")))?;

    let num_params = head.get() as usize;
    let mut oids = Vec::with_capacity(num_params);
    let mut data = &payload[2..];

    for _ in 0..num_params {
        let (oid, rest) = read_u32(data)?;
        oids.push(oid);
        data = rest;
    }

    Ok(BackendMessage::ParameterDescription(oids))
}

/// Parse error/notice fields from payload.
fn parse_fields(payload: &[u8]) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut data = payload;

    while !data.is_empty() && data[0] != 0 {
        let kind = data[0];
        data = &data[1..];

        let (value, rest) = read_cstr(data)?;
        data = rest;

        match kind {
            field_type::SEVERITY => fields.severity = Some(value.to_string()),
            field_type::CODE => fields.code = Some(value.to_string()),
            field_type::MESSAGE => fields.message = Some(value.to_string()),
            field_type::DETAIL => fields.detail = Some(value.to_string()),
            field_type::HINT => fields.hint = Some(value.to_string()),
            field_type::POSITION => fields.position = value.parse().ok(),
            field_type::INTERNAL_QUERY => fields.internal_query = Some(value.to_string()),
            field_type::WHERE => fields.where_ = Some(value.to_string()),
            field_type::FILE => fields.file = Some(value.to_string()),
            field_type::LINE => fields.line = value.parse().ok(),
            field_type::ROUTINE => fields.routine = Some(value.to_string()),
            _ => {
                tracing::debug!("unknown error field type: {}", kind as char);
            }
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::FormatCode;

    fn field(name: &str, type_oid: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&0_u32.to_be_bytes()); // table oid
        out.extend_from_slice(&0_i16.to_be_bytes()); // column id
        out.extend_from_slice(&type_oid.to_be_bytes());
        out.extend_from_slice(&(-1_i16).to_be_bytes()); // type size
        out.extend_from_slice(&(-1_i32).to_be_bytes()); // type modifier
        out.extend_from_slice(&0_u16.to_be_bytes()); // text format
        out
    }

    #[test]
    fn row_description() {
        let mut payload = 2_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&field("id", 23));
        payload.extend_from_slice(&field("name", 25));

        let BackendMessage::RowDescription(cols) =
            BackendMessage::decode(msg_type::ROW_DESCRIPTION, &payload).unwrap()
        else {
            panic!("expected RowDescription");
        };
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].name, "id");
        assert_eq!(cols[0].type_oid, 23);
        assert_eq!(cols[1].name, "name");
        assert_eq!(cols[1].format, FormatCode::Text);
    }

    #[test]
    fn data_row_with_null() {
        let mut payload = 3_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&2_i32.to_be_bytes());
        payload.extend_from_slice(b"42");
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_i32.to_be_bytes());

        let BackendMessage::DataRow(values) =
            BackendMessage::decode(msg_type::DATA_ROW, &payload).unwrap()
        else {
            panic!("expected DataRow");
        };
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].as_deref(), Some(&b"42"[..]));
        assert_eq!(values[1], None);
        assert_eq!(values[2].as_deref(), Some(&b""[..]));
    }

    #[test]
    fn error_response_fields() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"SERROR\0");
        payload.extend_from_slice(b"C42601\0");
        payload.extend_from_slice(b"Msyntax error\0");
        payload.push(0);

        let BackendMessage::ErrorResponse(fields) =
            BackendMessage::decode(msg_type::ERROR_RESPONSE, &payload).unwrap()
        else {
            panic!("expected ErrorResponse");
        };
        assert_eq!(fields.severity.as_deref(), Some("ERROR"));
        assert_eq!(fields.code.as_deref(), Some("42601"));
        assert_eq!(fields.message.as_deref(), Some("syntax error"));
    }

    #[test]
    fn truncated_data_row_rejected() {
        let mut payload = 1_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&100_i32.to_be_bytes());
        payload.extend_from_slice(b"short");
        assert!(BackendMessage::decode(msg_type::DATA_ROW, &payload).is_err());
    }

    #[test]
    fn unknown_type_byte_rejected() {
        assert!(BackendMessage::decode(b'?', &[]).is_err());
    }
}
