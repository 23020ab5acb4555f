//! On-disk format of the ahead log
//!
//! The log is a concatenation of JSON-encoded documents, each terminated by
//! a single `0x00` byte. It only ever holds queue entries that did not
//! reach the back end before shutdown, and it is consumed to completion on
//! the next startup.

use std::io::{BufRead, Write};

use crate::document::DocumentComment;
use crate::errors::{SearchError, SearchResult};
use crate::types::CancelToken;

pub(crate) const WAL_FILE_NAME: &str = "unindexed.log";

const RECORD_SEPARATOR: u8 = 0x00;

/// Append one document record to the log.
pub(crate) fn append_record(writer: &mut impl Write, doc: &DocumentComment) -> SearchResult<()> {
    let mut data = serde_json::to_vec(doc)?;
    data.push(RECORD_SEPARATOR);
    writer.write_all(&data)?;
    Ok(())
}

/// Read records until EOF, feeding each decoded document into `sink`.
///
/// EOF terminates the replay cleanly; a trailing fragment without its
/// separator is discarded as an incomplete shutdown write. A decode or read
/// error aborts the replay so the file can be kept for manual recovery.
/// The cancellation flag is honored between records.
pub(crate) fn replay(
    reader: &mut impl BufRead,
    cancel: &CancelToken,
    mut sink: impl FnMut(DocumentComment) -> SearchResult<()>,
) -> SearchResult<()> {
    let mut buf = Vec::new();
    loop {
        if cancel.is_cancelled() {
            return Err(SearchError::ReplayInterrupted);
        }
        buf.clear();
        let read = reader.read_until(RECORD_SEPARATOR, &mut buf)?;
        if read == 0 {
            return Ok(());
        }
        if buf.last() != Some(&RECORD_SEPARATOR) {
            return Ok(());
        }
        buf.pop();
        let doc: DocumentComment = serde_json::from_slice(&buf)?;
        sink(doc)?;
    }
}
