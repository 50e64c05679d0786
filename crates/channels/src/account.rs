//! Account records.
//!
//! An [`Account`] carries the identity and subscription state every platform
//! shares; the platform-specific payload lives in [`AccountKind`].

use {
    serde::{Deserialize, Serialize},
    switchboard_common::Platform,
    switchboard_oauth::Credential,
};

/// Instagram professional profile linked to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstagramLink {
    pub id: String,
    pub username: String,
}

/// A phone number registered under a business account.
///
/// The owning account is found through the registry's sub-resource index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub id: String,
    pub display_phone_number: String,
    pub verified_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<InstagramLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessPayload {
    #[serde(default)]
    pub phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountKind {
    Page(PagePayload),
    BusinessAccount(BusinessPayload),
}

impl AccountKind {
    /// Platform family this kind of account belongs to.
    #[must_use]
    pub fn platform(&self) -> Platform {
        match self {
            Self::Page(_) => Platform::Messenger,
            Self::BusinessAccount(_) => Platform::WhatsApp,
        }
    }
}

/// A remote account the gateway acts on behalf of.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Never persisted; recovered by revalidation after a restore.
    pub credential: Option<Credential>,
    /// Webhook fields the app is subscribed to. Empty means unsubscribed.
    pub subscribed_fields: Vec<String>,
    /// Id of the user whose authorization discovered this account.
    pub authorized_by: Option<String>,
    pub kind: AccountKind,
}

impl Account {
    #[must_use]
    pub fn page(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, AccountKind::Page(PagePayload::default()))
    }

    #[must_use]
    pub fn business(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            id,
            name,
            AccountKind::BusinessAccount(BusinessPayload::default()),
        )
    }

    fn new(id: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            credential: None,
            subscribed_fields: Vec::new(),
            authorized_by: None,
            kind,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    #[must_use]
    pub fn with_instagram(mut self, link: InstagramLink) -> Self {
        if let AccountKind::Page(page) = &mut self.kind {
            page.instagram = Some(link);
        }
        self
    }

    #[must_use]
    pub fn with_phone(mut self, phone: PhoneNumber) -> Self {
        if let AccountKind::BusinessAccount(business) = &mut self.kind {
            business.phone_numbers.push(phone);
        }
        self
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.kind.platform()
    }

    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        !self.subscribed_fields.is_empty()
    }

    /// Ids of the resources inbound events may be addressed to instead of
    /// the account itself: a page's Instagram profile, a business account's
    /// phone numbers.
    #[must_use]
    pub fn sub_resource_ids(&self) -> Vec<&str> {
        match &self.kind {
            AccountKind::Page(page) => page.instagram.iter().map(|ig| ig.id.as_str()).collect(),
            AccountKind::BusinessAccount(business) => business
                .phone_numbers
                .iter()
                .map(|p| p.id.as_str())
                .collect(),
        }
    }

    pub(crate) fn drop_sub_resource(&mut self, id: &str) {
        match &mut self.kind {
            AccountKind::Page(page) => {
                if page.instagram.as_ref().is_some_and(|ig| ig.id == id) {
                    page.instagram = None;
                }
            },
            AccountKind::BusinessAccount(business) => {
                business.phone_numbers.retain(|p| p.id != id);
            },
        }
    }

    #[must_use]
    pub fn phone_numbers(&self) -> &[PhoneNumber] {
        match &self.kind {
            AccountKind::BusinessAccount(business) => &business.phone_numbers,
            AccountKind::Page(_) => &[],
        }
    }

    #[must_use]
    pub fn instagram(&self) -> Option<&InstagramLink> {
        match &self.kind {
            AccountKind::Page(page) => page.instagram.as_ref(),
            AccountKind::BusinessAccount(_) => None,
        }
    }

    #[must_use]
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            platform: self.platform(),
            subscribed: self.is_subscribed(),
            subscribed_fields: self.subscribed_fields.clone(),
            has_credential: self.credential.is_some(),
            authorized_by: self.authorized_by.clone(),
            instagram: self.instagram().cloned(),
            phone_numbers: self.phone_numbers().to_vec(),
        }
    }
}

/// Credential-free view of an account, as listed by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub subscribed: bool,
    pub subscribed_fields: Vec<String>,
    pub has_credential: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instagram: Option<InstagramLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub phone_numbers: Vec<PhoneNumber>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn phone(id: &str) -> PhoneNumber {
        PhoneNumber {
            id: id.into(),
            display_phone_number: format!("+1 555 {id}"),
            verified_name: "Acme".into(),
        }
    }

    #[test]
    fn sub_resources_per_kind() {
        let page = Account::page("1", "Acme").with_instagram(InstagramLink {
            id: "17841".into(),
            username: "acme".into(),
        });
        assert_eq!(page.sub_resource_ids(), vec!["17841"]);
        assert_eq!(page.platform(), Platform::Messenger);

        let waba = Account::business("2", "Acme")
            .with_phone(phone("10"))
            .with_phone(phone("11"));
        assert_eq!(waba.sub_resource_ids(), vec!["10", "11"]);
        assert_eq!(waba.platform(), Platform::WhatsApp);
    }

    #[test]
    fn builders_ignore_mismatched_payloads() {
        let page = Account::page("1", "Acme").with_phone(phone("10"));
        assert!(page.phone_numbers().is_empty());
        let waba = Account::business("2", "Acme").with_instagram(InstagramLink {
            id: "1".into(),
            username: "x".into(),
        });
        assert!(waba.instagram().is_none());
    }

    #[test]
    fn summary_hides_credential() {
        let mut account = Account::page("1", "Acme").with_credential(Credential::new("EAAsecret"));
        account.subscribed_fields = vec!["messages".into()];
        let summary = account.summary();
        assert!(summary.subscribed);
        assert!(summary.has_credential);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("EAAsecret"));
        assert!(!json.contains("phone_numbers"));
        assert!(json.contains("\"platform\":\"messenger\""));
    }
}
