//! Cyphal/CAN 29-bit identifier layout
//!
//! Transceivers talking to a raw CAN controller use these helpers to map a [`Header`] onto
//! an extended CAN ID and back.

use telenode_core::{NodeId, Priority, ServiceId, SubjectId};

use crate::frame::{DataSpecifier, Header};

const CAN_ID_MASK: u32 = lsb_mask(29);
const NODE_ID_MASK: u32 = lsb_mask(7);
const SUBJECT_ID_MASK: u32 = lsb_mask(13);
const SERVICE_ID_MASK: u32 = lsb_mask(9);
const PRIORITY_MASK: u32 = lsb_mask(3);

const PRIORITY_OFFSET: u32 = 26;
const SOURCE_OFFSET: u32 = 0;
const MSG_SUBJECT_OFFSET: u32 = 8;
const SRV_DESTINATION_OFFSET: u32 = 7;
const SRV_SERVICE_OFFSET: u32 = 14;

const SERVICE_FLAG: u32 = 1 << 25;
const RES_23_FLAG: u32 = 1 << 23;
const MSG_ANONYMOUS_FLAG: u32 = 1 << 24;
const MSG_RES_7_FLAG: u32 = 1 << 7;
// Bits 21 and 22 are set on transmission and ignored on reception.
const MSG_RES_21_22: u32 = 0b11 << 21;
const SRV_REQUEST_FLAG: u32 = 1 << 24;

/// Builds the extended CAN ID of a frame.
///
/// Anonymous messages carry `pseudo_source` in the source field. Callers usually derive it
/// from the payload so that concurrent anonymous senders are unlikely to collide.
pub fn encode(header: &Header, pseudo_source: u8) -> u32 {
    let priority = u32::from(header.priority.into_u8()) << PRIORITY_OFFSET;
    let source = match header.source {
        Some(node) => u32::from(node.into_u8()),
        None => u32::from(pseudo_source) & NODE_ID_MASK,
    } << SOURCE_OFFSET;

    let body = match header.data_spec {
        DataSpecifier::Message(subject) => {
            let anonymous = if header.source.is_none() {
                MSG_ANONYMOUS_FLAG
            } else {
                0
            };
            MSG_RES_21_22 | anonymous | u32::from(subject.into_u16()) << MSG_SUBJECT_OFFSET
        }
        DataSpecifier::Request(service) | DataSpecifier::Response(service) => {
            let request = if matches!(header.data_spec, DataSpecifier::Request(_)) {
                SRV_REQUEST_FLAG
            } else {
                0
            };
            let destination = header.destination.map_or(0, |node| u32::from(node.into_u8()));
            SERVICE_FLAG
                | request
                | u32::from(service.into_u16()) << SRV_SERVICE_OFFSET
                | destination << SRV_DESTINATION_OFFSET
        }
    };

    (priority | body | source) & CAN_ID_MASK
}

/// Parses an extended CAN ID. Returns `None` for IDs that violate reserved bit values.
pub fn decode(can_id: u32) -> Option<Header> {
    let can_id = can_id & CAN_ID_MASK;
    if can_id & RES_23_FLAG != 0 {
        return None;
    }

    let priority = Priority::from_u8_truncating((can_id >> PRIORITY_OFFSET) as u8);
    let source = NodeId::new(((can_id >> SOURCE_OFFSET) & NODE_ID_MASK) as u8)?;

    if can_id & SERVICE_FLAG == 0 {
        if can_id & MSG_RES_7_FLAG != 0 {
            return None;
        }
        let subject = SubjectId::new(((can_id >> MSG_SUBJECT_OFFSET) & SUBJECT_ID_MASK) as u16)?;
        let source = (can_id & MSG_ANONYMOUS_FLAG == 0).then_some(source);
        Some(Header::message(priority, subject, source))
    } else {
        let service = ServiceId::new(((can_id >> SRV_SERVICE_OFFSET) & SERVICE_ID_MASK) as u16)?;
        let destination =
            NodeId::new(((can_id >> SRV_DESTINATION_OFFSET) & NODE_ID_MASK) as u8)?;
        let data_spec = if can_id & SRV_REQUEST_FLAG != 0 {
            DataSpecifier::Request(service)
        } else {
            DataSpecifier::Response(service)
        };
        Some(Header {
            priority,
            data_spec,
            source: Some(source),
            destination: Some(destination),
        })
    }
}

const fn lsb_mask(n: u32) -> u32 {
    if n > 0 {
        u32::MAX >> (u32::BITS - n)
    } else {
        0
    }
}
