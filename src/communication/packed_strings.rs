use std::sync::Arc;

use bytes::Bytes;

use crate::{
    communication::{Comm, CommunicationError, MsgTag, SendRequest},
    logger::Logger,
    Rank,
};

/// The byte appended to every line before packing, and split on when
/// unpacking.
pub const LINE_DELIMITER: u8 = b'\n';

/// The longest line the receiver will reassemble. Longer lines are split at
/// this boundary.
pub const MAX_LINE_LENGTH: usize = 2048;

/// Distributes a vector of text lines from one rank to many as a single
/// packed message.
///
/// The send side is asynchronous: every [`isend`](PackedStringChannel::isend)
/// stores the packed buffer in a slot owned by the channel, so the bytes stay
/// live until [`wait_all`](PackedStringChannel::wait_all) observes all posted
/// sends complete and releases them. Slots are indexed by the running send
/// count and the slot table grows on demand, so concurrent outstanding sends
/// can never collide on a slot.
///
/// The receive side is synchronous: one probe, one receive, then the payload
/// is split back into its non-empty lines.
pub struct PackedStringChannel {
    comm: Arc<Comm>,
    logger: Logger,
    buffers: Vec<Option<Bytes>>,
    requests: Vec<SendRequest>,
    send_count: usize,
}

impl PackedStringChannel {
    /// Creates a channel; the slot table starts sized from the process-group
    /// size.
    pub fn new(comm: Arc<Comm>, logger: Logger) -> Self {
        let size = comm.size();
        Self {
            comm,
            logger,
            buffers: vec![None; size],
            requests: Vec::new(),
            send_count: 0,
        }
    }

    /// Appends the line delimiter to every line and concatenates them into
    /// one buffer.
    fn pack_lines(lines: &[String]) -> Bytes {
        let total: usize = lines.iter().map(|line| line.len() + 1).sum();
        let mut buffer = Vec::with_capacity(total);
        for line in lines {
            buffer.extend_from_slice(line.as_bytes());
            buffer.push(LINE_DELIMITER);
        }
        Bytes::from(buffer)
    }

    /// Posts an asynchronous send of `lines` to `destination`.
    ///
    /// The packed buffer is retained in the channel until
    /// [`wait_all`](PackedStringChannel::wait_all) completes.
    pub fn isend(
        &mut self,
        destination: Rank,
        tag: MsgTag,
        lines: &[String],
    ) -> Result<(), CommunicationError> {
        let packed = Self::pack_lines(lines);
        let slot = self.send_count;
        if slot >= self.buffers.len() {
            self.buffers.resize(slot + 1, None);
        }
        self.buffers[slot] = Some(packed.clone());
        let request = self.comm.isend(destination, tag, packed)?;
        self.requests.push(request);
        self.send_count += 1;
        Ok(())
    }

    /// Blocks until every posted send has completed, then releases the owned
    /// buffers.
    ///
    /// Failures are reported as error log lines naming the message tag, the
    /// peer rank, and the error.
    pub async fn wait_all(&mut self) {
        if self.requests.is_empty() {
            return;
        }
        let requests = std::mem::take(&mut self.requests);
        let statuses = self.comm.wait_all(requests).await;
        for status in &statuses {
            if let Some(error) = &status.error {
                self.logger.error(&format!(
                    "packed string send failed. Error: {} Message tag: {} Destination rank: {}",
                    error, status.tag, status.rank
                ));
            }
        }
        for slot in self.buffers.iter_mut() {
            *slot = None;
        }
        self.send_count = 0;
    }

    /// Receives one packed message from `source` and splits it back into its
    /// lines. Empty lines are dropped; lines longer than
    /// [`MAX_LINE_LENGTH`] are split at the boundary.
    pub async fn receive(
        &self,
        source: Rank,
        tag: MsgTag,
    ) -> Result<Vec<String>, CommunicationError> {
        let status = self.comm.probe(Some(source), Some(tag)).await;
        let (_, payload) = self.comm.recv(Some(status.source), Some(tag)).await;
        if payload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(split_lines(&payload))
    }

    /// The number of sends posted since the last
    /// [`wait_all`](PackedStringChannel::wait_all).
    pub fn pending_sends(&self) -> usize {
        self.requests.len()
    }
}

/// Splits a packed buffer into its non-empty lines, honoring the line-length
/// cap.
fn split_lines(payload: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    for &byte in payload {
        if byte == LINE_DELIMITER {
            commit_line(&mut lines, &mut current);
        } else {
            current.push(byte);
            if current.len() == MAX_LINE_LENGTH {
                commit_line(&mut lines, &mut current);
            }
        }
    }
    commit_line(&mut lines, &mut current);
    lines
}

fn commit_line(lines: &mut Vec<String>, current: &mut Vec<u8>) {
    if !current.is_empty() {
        lines.push(String::from_utf8_lossy(current).into_owned());
        current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_appends_a_delimiter_per_line() {
        let lines = vec!["line 1".to_string(), "line 2".to_string()];
        let packed = PackedStringChannel::pack_lines(&lines);
        assert_eq!(&packed[..], b"line 1\nline 2\n");
    }

    #[test]
    fn splitting_drops_empty_lines() {
        let lines = split_lines(b"line 1\n\n\nline 2\nlast line\n");
        assert_eq!(
            lines,
            vec![
                "line 1".to_string(),
                "line 2".to_string(),
                "last line".to_string()
            ]
        );
    }

    #[test]
    fn overlong_lines_split_at_the_boundary() {
        let mut payload = vec![b'x'; MAX_LINE_LENGTH + 10];
        payload.push(LINE_DELIMITER);
        let lines = split_lines(&payload);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH);
        assert_eq!(lines[1].len(), 10);
    }

    #[test]
    fn unterminated_final_line_is_committed() {
        let lines = split_lines(b"tail");
        assert_eq!(lines, vec!["tail".to_string()]);
    }
}
