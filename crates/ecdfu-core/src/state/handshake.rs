//! Session handshake over the bulk pipe.
//!
//! Flush, start request, validate, populate. A [`Session`] only exists once
//! every step has passed.

use tracing::{debug, info, instrument};

use super::machine::{HandshakeMachine, HandshakeState};
use crate::error::{DfuError, Result};
use crate::protocol::constants::{
    FIRST_RESPONSE_PDU_SIZE, MAX_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION, MIN_START_RESPONSE_SIZE,
};
use crate::protocol::{FirstResponsePdu, StartResponse, UpdateFrameHeader};
use crate::retry::retry;
use crate::session::{Session, UpdateConfig};
use crate::transport::BulkTransport;
use crate::version::VersionDecoder;

/// Open an update session.
#[instrument(level = "info", skip_all)]
pub fn negotiate<T, D>(transport: &T, decoder: &D, config: &UpdateConfig) -> Result<Session>
where
    T: BulkTransport + ?Sized,
    D: VersionDecoder + ?Sized,
{
    let mut machine = HandshakeMachine::new();
    let result = run(&mut machine, transport, decoder, config);
    if let Err(e) = &result {
        machine.fail(e);
    }
    result
}

fn run<T, D>(
    machine: &mut HandshakeMachine,
    transport: &T,
    decoder: &D,
    config: &UpdateConfig,
) -> Result<Session>
where
    T: BulkTransport + ?Sized,
    D: VersionDecoder + ?Sized,
{
    let policy = config.setup_policy();

    retry(machine, "flush", policy, |_| Ok(transport.flush()?))?;

    machine.goto_state(HandshakeState::Starting);
    let pdu = retry(machine, "start request", policy, |_| start_request(transport))?;

    machine.goto_state(HandshakeState::Validating);
    validate(&pdu)?;

    let raw = pdu.version_str();
    let version = decoder
        .decode(&raw)
        .map_err(|source| DfuError::Version {
            raw: raw.clone(),
            source,
        })?;
    let session = Session::from_response(&pdu, version);

    machine.goto_state(HandshakeState::Established);
    info!(
        protocol_version = session.protocol_version(),
        max_pdu_size = session.max_pdu_size(),
        writable_offset = %format!("{:#x}", session.writable_offset()),
        version = %session.raw_version(),
        "Session established"
    );
    Ok(session)
}

/// Send the start request and read the device's parameters.
fn start_request<T: BulkTransport + ?Sized>(transport: &T) -> Result<FirstResponsePdu> {
    let request = UpdateFrameHeader::start_request();
    transport.write(&request.to_bytes())?;

    let reply = transport.read(FIRST_RESPONSE_PDU_SIZE, true)?;
    debug!(len = reply.len(), "Start response");
    let too_short = DfuError::ResponseTooShort {
        actual: reply.len(),
        minimum: MIN_START_RESPONSE_SIZE,
    };
    match StartResponse::parse(&reply) {
        Ok(StartResponse::Pdu(pdu)) => Ok(pdu),
        // Pre-version-5 firmware; not supported
        Ok(StartResponse::Legacy { response_code }) => {
            debug!(response_code, "Legacy start response");
            Err(too_short)
        }
        Err(_) => Err(too_short),
    }
}

fn validate(pdu: &FirstResponsePdu) -> Result<()> {
    if !(MIN_PROTOCOL_VERSION..=MAX_PROTOCOL_VERSION).contains(&pdu.protocol_version) {
        return Err(DfuError::UnsupportedProtocol(pdu.protocol_version));
    }
    if pdu.return_value != 0 {
        return Err(DfuError::TargetError(pdu.return_value));
    }
    if pdu.maximum_pdu_size == 0 {
        return Err(DfuError::InvalidPduSize);
    }
    Ok(())
}
