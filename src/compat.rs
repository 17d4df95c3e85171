//! Uniform access to `VersionedMessage` internals
//!
//! Envelopes are always v0 messages, but tests and the relay encoder also see
//! legacy messages (e.g. when decoding fixtures). These helpers hide the
//! variant split so signing and inspection code reads the same for both.

use solana_sdk::{
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

#[inline]
#[must_use]
pub fn message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy) => &legacy.header,
        VersionedMessage::V0(v0) => &v0.header,
    }
}

/// Keys embedded in the message, excluding addresses loaded from tables
#[inline]
#[must_use]
pub fn static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy) => &legacy.account_keys,
        VersionedMessage::V0(v0) => &v0.account_keys,
    }
}

/// Keys that must sign, in signature order
///
/// Always the first `num_required_signatures` static keys; index 0 is the
/// fee payer.
#[inline]
#[must_use]
pub fn required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let keys = static_account_keys(message);
    let n = message_header(message).num_required_signatures as usize;
    &keys[..n.min(keys.len())]
}

#[inline]
#[must_use]
pub fn fee_payer(message: &VersionedMessage) -> Option<&Pubkey> {
    static_account_keys(message).first()
}

/// Number of addresses resolved through address tables
///
/// Zero for legacy messages and for v0 messages compiled without a table.
#[must_use]
pub fn loaded_address_count(message: &VersionedMessage) -> usize {
    match message {
        VersionedMessage::Legacy(_) => 0,
        VersionedMessage::V0(v0) => v0
            .address_table_lookups
            .iter()
            .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
            .sum(),
    }
}

#[inline]
#[must_use]
pub fn is_compressed(message: &VersionedMessage) -> bool {
    loaded_address_count(message) > 0
}
