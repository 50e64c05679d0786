//! Binary backup format of an account registry.
//!
//! ```text
//! header  := "SWB1" version:u8 platform:u8 count:u32
//! record  := id:str name:str kind:u8 fields:u16 str* authorized_by:opt<str> payload
//! page    := instagram:opt<(id:str username:str)>
//! business:= phones:u16 (id:str display:str verified:str)*
//! str     := len:u32 utf8
//! opt<T>  := 0 | 1 T
//! ```
//!
//! Integers are big-endian. Credentials are never written.

use std::collections::HashSet;

use {
    bytes::{Buf, BufMut, BytesMut},
    switchboard_common::Platform,
};

use crate::{
    account::{
        Account, AccountKind, BusinessPayload, InstagramLink, PagePayload, PhoneNumber,
    },
    error::{Error, Result},
};

const MAGIC: &[u8; 4] = b"SWB1";
const VERSION: u8 = 1;
const KIND_PAGE: u8 = 0;
const KIND_BUSINESS: u8 = 1;

/// Decoded backup.
#[derive(Debug)]
pub struct Snapshot {
    pub platform: Platform,
    pub accounts: Vec<Account>,
}

/// Encode `accounts` of `platform`. Deterministic for a given input order.
#[must_use]
pub fn encode(platform: Platform, accounts: &[Account]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64 + accounts.len() * 64);
    buf.put_slice(MAGIC);
    buf.put_u8(VERSION);
    buf.put_u8(platform.tag());
    buf.put_u32(len_u32(accounts.len()));

    for account in accounts {
        put_str(&mut buf, &account.id);
        put_str(&mut buf, &account.name);
        buf.put_u8(match account.kind {
            AccountKind::Page(_) => KIND_PAGE,
            AccountKind::BusinessAccount(_) => KIND_BUSINESS,
        });
        buf.put_u16(len_u16(account.subscribed_fields.len()));
        for field in account.subscribed_fields.iter().take(usize::from(u16::MAX)) {
            put_str(&mut buf, field);
        }
        put_opt_str(&mut buf, account.authorized_by.as_deref());

        match &account.kind {
            AccountKind::Page(page) => match &page.instagram {
                Some(ig) => {
                    buf.put_u8(1);
                    put_str(&mut buf, &ig.id);
                    put_str(&mut buf, &ig.username);
                },
                None => buf.put_u8(0),
            },
            AccountKind::BusinessAccount(business) => {
                buf.put_u16(len_u16(business.phone_numbers.len()));
                for phone in business.phone_numbers.iter().take(usize::from(u16::MAX)) {
                    put_str(&mut buf, &phone.id);
                    put_str(&mut buf, &phone.display_phone_number);
                    put_str(&mut buf, &phone.verified_name);
                }
            },
        }
    }
    buf.to_vec()
}

/// Decode a backup produced by [`encode`].
///
/// Fails with [`Error::StateCorruption`] on truncation, trailing bytes,
/// unknown tags, or duplicated account or sub-resource ids.
pub fn decode(bytes: &[u8]) -> Result<Snapshot> {
    let mut buf = bytes;

    need(&buf, 10, "header")?;
    if &buf[..4] != MAGIC {
        return Err(Error::corruption("bad magic"));
    }
    buf.advance(4);
    let version = buf.get_u8();
    if version != VERSION {
        return Err(Error::corruption(format!("unsupported version {version}")));
    }
    let tag = buf.get_u8();
    let platform = Platform::from_tag(tag)
        .ok_or_else(|| Error::corruption(format!("unknown platform tag {tag}")))?;
    let count = buf.get_u32();

    let mut accounts = Vec::new();
    let mut ids = HashSet::new();
    let mut sub_ids = HashSet::new();

    for _ in 0..count {
        let id = get_str(&mut buf, "account id")?;
        let name = get_str(&mut buf, "account name")?;
        need(&buf, 1, "account kind")?;
        let kind_tag = buf.get_u8();

        need(&buf, 2, "field count")?;
        let field_count = buf.get_u16();
        let mut subscribed_fields = Vec::with_capacity(usize::from(field_count).min(32));
        for _ in 0..field_count {
            subscribed_fields.push(get_str(&mut buf, "subscribed field")?);
        }
        let authorized_by = get_opt_str(&mut buf, "authorized_by")?;

        let kind = match kind_tag {
            KIND_PAGE => {
                let instagram = match get_flag(&mut buf, "instagram")? {
                    true => Some(InstagramLink {
                        id: get_str(&mut buf, "instagram id")?,
                        username: get_str(&mut buf, "instagram username")?,
                    }),
                    false => None,
                };
                AccountKind::Page(PagePayload { instagram })
            },
            KIND_BUSINESS => {
                need(&buf, 2, "phone count")?;
                let phone_count = buf.get_u16();
                let mut phone_numbers = Vec::with_capacity(usize::from(phone_count).min(32));
                for _ in 0..phone_count {
                    phone_numbers.push(PhoneNumber {
                        id: get_str(&mut buf, "phone id")?,
                        display_phone_number: get_str(&mut buf, "phone number")?,
                        verified_name: get_str(&mut buf, "verified name")?,
                    });
                }
                AccountKind::BusinessAccount(BusinessPayload { phone_numbers })
            },
            other => return Err(Error::corruption(format!("unknown account kind {other}"))),
        };
        if kind.platform() != platform {
            return Err(Error::corruption(format!(
                "account {id} does not belong to {platform}"
            )));
        }

        let account = Account {
            id,
            name,
            credential: None,
            subscribed_fields,
            authorized_by,
            kind,
        };
        if !ids.insert(account.id.clone()) {
            return Err(Error::corruption(format!("duplicate account {}", account.id)));
        }
        for sub_id in account.sub_resource_ids() {
            if !sub_ids.insert(sub_id.to_string()) {
                return Err(Error::corruption(format!("duplicate sub-resource {sub_id}")));
            }
        }
        accounts.push(account);
    }

    if buf.has_remaining() {
        return Err(Error::corruption(format!(
            "{} trailing bytes",
            buf.remaining()
        )));
    }

    Ok(Snapshot { platform, accounts })
}

// ── Primitives ──────────────────────────────────────────────────────────────

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn len_u16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or(u16::MAX)
}

fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u32(len_u32(value.len()));
    buf.put_slice(value.as_bytes());
}

fn put_opt_str(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(value) => {
            buf.put_u8(1);
            put_str(buf, value);
        },
        None => buf.put_u8(0),
    }
}

fn need(buf: &&[u8], len: usize, what: &str) -> Result<()> {
    if buf.remaining() < len {
        return Err(Error::corruption(format!("truncated {what}")));
    }
    Ok(())
}

fn get_flag(buf: &mut &[u8], what: &str) -> Result<bool> {
    need(buf, 1, what)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::corruption(format!("bad {what} flag {other}"))),
    }
}

fn get_str(buf: &mut &[u8], what: &str) -> Result<String> {
    need(buf, 4, what)?;
    let len = buf.get_u32() as usize;
    need(buf, len, what)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| Error::corruption(format!("{what} is not UTF-8")))
}

fn get_opt_str(buf: &mut &[u8], what: &str) -> Result<Option<String>> {
    match get_flag(buf, what)? {
        true => get_str(buf, what).map(Some),
        false => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, switchboard_oauth::Credential};

    fn waba() -> Account {
        let mut account = Account::business("102290129340398", "Acme Support")
            .with_credential(Credential::new("EAAsecret"))
            .with_phone(PhoneNumber {
                id: "106540352242922".into(),
                display_phone_number: "+1 555-0100".into(),
                verified_name: "Acme".into(),
            });
        account.subscribed_fields = vec!["messages".into()];
        account.authorized_by = Some("4705278912843591".into());
        account
    }

    #[test]
    fn encodes_header() {
        let bytes = encode(Platform::WhatsApp, &[]);
        assert_eq!(bytes, b"SWB1\x01\x02\x00\x00\x00\x00");
        let snapshot = decode(&bytes).unwrap();
        assert_eq!(snapshot.platform, Platform::WhatsApp);
        assert!(snapshot.accounts.is_empty());
    }

    #[test]
    fn credentials_are_not_written() {
        let bytes = encode(Platform::WhatsApp, &[waba()]);
        assert!(!bytes.windows(9).any(|w| w == b"EAAsecret"));

        let snapshot = decode(&bytes).unwrap();
        let account = &snapshot.accounts[0];
        assert!(account.credential.is_none());
        assert_eq!(account.subscribed_fields, vec!["messages"]);
        assert_eq!(account.authorized_by.as_deref(), Some("4705278912843591"));
        assert_eq!(account.phone_numbers()[0].verified_name, "Acme");
    }

    #[test]
    fn every_truncation_is_rejected() {
        let bytes = encode(Platform::WhatsApp, &[waba()]);
        for len in 0..bytes.len() {
            assert!(
                matches!(decode(&bytes[..len]), Err(Error::StateCorruption { .. })),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(Platform::Messenger, &[Account::page("1", "Acme")]);
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let account = Account::page("1", "Acme");
        let bytes = encode(Platform::Messenger, &[account.clone(), account]);
        assert!(decode(&bytes).unwrap_err().to_string().contains("duplicate account"));

        let mut other = waba();
        other.id = "2".into();
        let bytes = encode(Platform::WhatsApp, &[waba(), other]);
        assert!(decode(&bytes).unwrap_err().to_string().contains("duplicate sub-resource"));
    }

    #[test]
    fn kind_must_match_platform() {
        let bytes = encode(Platform::Messenger, &[waba()]);
        assert!(matches!(decode(&bytes), Err(Error::StateCorruption { .. })));
    }

    #[test]
    fn bad_header_is_rejected() {
        let mut bytes = encode(Platform::Messenger, &[]);
        bytes[4] = 9;
        assert!(decode(&bytes).unwrap_err().to_string().contains("version"));
        let mut bytes = encode(Platform::Messenger, &[]);
        bytes[5] = 7;
        assert!(decode(&bytes).unwrap_err().to_string().contains("platform"));
        assert!(decode(b"XXXX\x01\x01\x00\x00\x00\x00").is_err());
    }
}
