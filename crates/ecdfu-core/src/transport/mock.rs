//! Mock transports for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{BulkTransport, FeatureReportTransport, TransportError};
use crate::protocol::constants::ETP_FEATURE_REPLY_PREFIX;

/// A scripted answer to one bulk read.
#[derive(Debug, Clone)]
enum MockReply {
    Data(Vec<u8>),
    Timeout,
}

/// Mock bulk transport for unit testing protocol logic.
pub struct MockTransport {
    /// Queued replies to return on read.
    reply_queue: Arc<Mutex<VecDeque<MockReply>>>,
    /// Stray bytes that a flush will find on the pipe.
    stray_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    flush_count: Arc<Mutex<usize>>,
    packet_size: usize,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            reply_queue: Arc::new(Mutex::new(VecDeque::new())),
            stray_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            flush_count: Arc::new(Mutex::new(0)),
            packet_size: 64,
            vid: 0x18D1,
            pid: 0x5022,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Use a different endpoint packet size.
    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    /// Queue a reply to be returned on next read.
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.reply_queue
            .lock()
            .unwrap()
            .push_back(MockReply::Data(bytes.to_vec()));
    }

    /// Queue a big-endian u32 reply.
    pub fn queue_reply_u32(&self, value: u32) {
        self.queue_reply(&value.to_be_bytes());
    }

    /// Queue a read that times out.
    pub fn queue_timeout(&self) {
        self.reply_queue.lock().unwrap().push_back(MockReply::Timeout);
    }

    /// Leave stray bytes on the pipe for the next flush to find.
    pub fn queue_stray(&self, bytes: &[u8]) {
        self.stray_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Replies not consumed yet.
    pub fn pending_replies(&self) -> usize {
        self.reply_queue.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    pub fn flush_count(&self) -> usize {
        *self.flush_count.lock().unwrap()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BulkTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn read(&self, max_len: usize, allow_short: bool) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        match self.reply_queue.lock().unwrap().pop_front() {
            Some(MockReply::Data(mut data)) => {
                data.truncate(max_len);
                if data.len() < max_len && !allow_short {
                    return Err(TransportError::PartialRead {
                        actual: data.len(),
                        expected: max_len,
                    });
                }
                Ok(data)
            }
            Some(MockReply::Timeout) | None => Err(TransportError::Timeout { timeout_ms: 5000 }),
        }
    }

    fn flush(&self) -> Result<(), TransportError> {
        *self.flush_count.lock().unwrap() += 1;
        match self.stray_queue.lock().unwrap().pop_front() {
            Some(stray) => Err(TransportError::NotIdle(stray.len())),
            None => Ok(()),
        }
    }

    fn packet_size(&self) -> usize {
        self.packet_size
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

/// Mock HID feature-report transport.
///
/// GET_FEATURE answers are served from a queue of register payloads; each is
/// returned behind the report ID and padding a real device would add.
pub struct MockFeatureTransport {
    register_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    report_log: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockFeatureTransport {
    pub fn new() -> Self {
        Self {
            register_queue: Arc::new(Mutex::new(VecDeque::new())),
            report_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the payload of the next register read.
    pub fn queue_register(&self, payload: &[u8]) {
        self.register_queue
            .lock()
            .unwrap()
            .push_back(payload.to_vec());
    }

    /// Queue a little-endian 16-bit register value.
    pub fn queue_register_u16(&self, value: u16) {
        self.queue_register(&value.to_le_bytes());
    }

    /// All SET_FEATURE reports, in order.
    pub fn get_reports(&self) -> Vec<Vec<u8>> {
        self.report_log.lock().unwrap().clone()
    }

    pub fn clear_reports(&self) {
        self.report_log.lock().unwrap().clear();
    }

    pub fn pending_registers(&self) -> usize {
        self.register_queue.lock().unwrap().len()
    }
}

impl Default for MockFeatureTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureReportTransport for MockFeatureTransport {
    fn set_feature(&self, report: &[u8]) -> Result<(), TransportError> {
        self.report_log.lock().unwrap().push(report.to_vec());
        Ok(())
    }

    fn get_feature(&self, report_id: u8, len: usize) -> Result<Vec<u8>, TransportError> {
        let payload = self
            .register_queue
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 1000 })?;
        let mut buf = vec![0u8; len.max(ETP_FEATURE_REPLY_PREFIX)];
        buf[0] = report_id;
        let n = payload.len().min(buf.len() - ETP_FEATURE_REPLY_PREFIX);
        buf[ETP_FEATURE_REPLY_PREFIX..ETP_FEATURE_REPLY_PREFIX + n].copy_from_slice(&payload[..n]);
        Ok(buf)
    }
}
