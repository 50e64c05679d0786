use std::{collections::HashMap, sync::RwLock};

use {
    switchboard_common::Platform,
    tracing::{debug, warn},
};

use crate::{
    account::Account,
    error::{Error, Result},
    snapshot,
};

#[derive(Debug, Default, Clone)]
struct RegistryState {
    accounts: HashMap<String, Account>,
    /// Sub-resource id (phone number, Instagram profile) to owning account id.
    owners: HashMap<String, String>,
}

impl RegistryState {
    fn merge(&mut self, mut account: Account, force: bool) -> bool {
        let created = !self.accounts.contains_key(&account.id);
        if !created && !force {
            return false;
        }

        if let Some(previous) = self.accounts.get(&account.id) {
            let stale: Vec<String> = previous
                .sub_resource_ids()
                .into_iter()
                .filter(|id| !account.sub_resource_ids().contains(id))
                .map(str::to_string)
                .collect();
            for id in stale {
                self.release(&id, &account.id);
            }
        }

        let sub_ids: Vec<String> = account
            .sub_resource_ids()
            .into_iter()
            .map(str::to_string)
            .collect();
        for sub_id in sub_ids {
            match self.owners.get(&sub_id) {
                Some(owner) if owner != &account.id && !force => {
                    // Only a full snapshot may take a sub-resource away.
                    warn!(
                        sub_id = %sub_id,
                        owner = %owner,
                        account_id = %account.id,
                        "sub-resource already owned, skipped"
                    );
                    account.drop_sub_resource(&sub_id);
                    continue;
                },
                Some(owner) if owner != &account.id => {
                    if let Some(previous_owner) = self.accounts.get_mut(owner) {
                        previous_owner.drop_sub_resource(&sub_id);
                    }
                    debug!(
                        sub_id = %sub_id,
                        from = %owner,
                        to = %account.id,
                        "sub-resource reassigned"
                    );
                },
                _ => {},
            }
            self.owners.insert(sub_id, account.id.clone());
        }

        if account.authorized_by.is_none()
            && let Some(previous) = self.accounts.get(&account.id)
        {
            account.authorized_by = previous.authorized_by.clone();
        }
        self.accounts.insert(account.id.clone(), account);
        created
    }

    fn remove(&mut self, id: &str) -> Option<Account> {
        let account = self.accounts.remove(id)?;
        for sub_id in account.sub_resource_ids() {
            self.release(sub_id, id);
        }
        Some(account)
    }

    fn release(&mut self, sub_id: &str, owner: &str) {
        if self.owners.get(sub_id).is_some_and(|o| o == owner) {
            self.owners.remove(sub_id);
        }
    }
}

/// Accounts of one platform, keyed by id, with a secondary index from
/// sub-resource ids to their owning account.
///
/// Every operation takes the lock once; readers get clones and never see a
/// half-applied batch.
pub struct AccountRegistry {
    platform: Platform,
    state: RwLock<RegistryState>,
}

impl AccountRegistry {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn get(&self, id: &str) -> Option<Account> {
        self.read().accounts.get(id).cloned()
    }

    /// Accounts for `ids`, silently skipping unknown ones. An empty slice
    /// lists every account, sorted by id.
    pub fn get_many(&self, ids: &[String]) -> Vec<Account> {
        let state = self.read();
        if ids.is_empty() {
            let mut all: Vec<Account> = state.accounts.values().cloned().collect();
            all.sort_by(|a, b| a.id.cmp(&b.id));
            return all;
        }
        ids.iter()
            .filter_map(|id| state.accounts.get(id).cloned())
            .collect()
    }

    /// Accounts for `ids`, failing with every id that is not registered.
    pub fn resolve(&self, ids: &[String]) -> Result<Vec<Account>> {
        let state = self.read();
        let missing: Vec<&String> = ids
            .iter()
            .filter(|id| !state.accounts.contains_key(*id))
            .collect();
        if !missing.is_empty() {
            return Err(Error::not_found(missing.into_iter().cloned()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| state.accounts.get(id).cloned())
            .collect())
    }

    /// Owner of a phone number or Instagram profile id.
    pub fn lookup(&self, sub_id: &str) -> Option<Account> {
        let state = self.read();
        let owner = state.owners.get(sub_id)?;
        state.accounts.get(owner).cloned()
    }

    /// Owner of `id`, which may name either the account itself or one of its
    /// sub-resources.
    pub fn resolve_recipient(&self, id: &str) -> Option<Account> {
        let state = self.read();
        if let Some(account) = state.accounts.get(id) {
            return Some(account.clone());
        }
        let owner = state.owners.get(id)?;
        state.accounts.get(owner).cloned()
    }

    /// Insert `account`, or replace an existing record when `force` is set.
    /// Returns whether the account was new.
    ///
    /// Replacing drops index entries for sub-resources the new record no
    /// longer lists. Accounts of another platform are ignored.
    pub fn merge(&self, account: Account, force: bool) -> bool {
        if !self.accepts(&account) {
            return false;
        }
        self.write().merge(account, force)
    }

    /// Merge several accounts under one lock. Returns how many were new.
    pub fn merge_all(&self, accounts: Vec<Account>, force: bool) -> usize {
        let mut state = self.write();
        accounts
            .into_iter()
            .filter(|account| self.accepts(account))
            .filter(|account| state.merge(account.clone(), force))
            .count()
    }

    /// Remove `ids`, returning the accounts that existed.
    pub fn delete(&self, ids: &[String]) -> Vec<Account> {
        let mut state = self.write();
        ids.iter().filter_map(|id| state.remove(id)).collect()
    }

    /// Remove every account discovered by `user_id`.
    pub fn delete_authorized_by(&self, user_id: &str) -> Vec<Account> {
        let mut state = self.write();
        let ids: Vec<String> = state
            .accounts
            .values()
            .filter(|a| a.authorized_by.as_deref() == Some(user_id))
            .map(|a| a.id.clone())
            .collect();
        ids.iter().filter_map(|id| state.remove(id)).collect()
    }

    /// Record new subscription state for several accounts at once. Unknown
    /// ids are skipped. Returns how many accounts changed.
    pub fn set_subscriptions(&self, updates: &[(String, Vec<String>)]) -> usize {
        let mut state = self.write();
        let mut changed = 0;
        for (id, fields) in updates {
            if let Some(account) = state.accounts.get_mut(id) {
                account.subscribed_fields = fields.clone();
                changed += 1;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.read().accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized, credential-free copy of every account.
    pub fn backup(&self) -> Vec<u8> {
        let accounts = self.get_many(&[]);
        snapshot::encode(self.platform, &accounts)
    }

    /// Merge the accounts of a backup without replacing existing records.
    ///
    /// The blob is fully decoded before anything is applied; on error the
    /// registry is left untouched.
    pub fn restore(&self, bytes: &[u8]) -> Result<usize> {
        let snapshot = snapshot::decode(bytes)?;
        if snapshot.platform != self.platform {
            return Err(Error::corruption(format!(
                "backup of {} restored into {}",
                snapshot.platform, self.platform
            )));
        }

        let mut state = self.write();
        let mut scratch = state.clone();
        let restored = snapshot
            .accounts
            .into_iter()
            .filter(|account| scratch.merge(account.clone(), false))
            .count();
        *state = scratch;
        debug!(platform = %self.platform, restored, "registry restored");
        Ok(restored)
    }

    fn accepts(&self, account: &Account) -> bool {
        if account.platform() != self.platform {
            warn!(
                account_id = %account.id,
                platform = %self.platform,
                "ignoring account of another platform"
            );
            return false;
        }
        true
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("platform", &self.platform)
            .field("accounts", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::account::PhoneNumber};

    fn phone(id: &str) -> PhoneNumber {
        PhoneNumber {
            id: id.into(),
            display_phone_number: format!("+1 555 {id}"),
            verified_name: "Acme".into(),
        }
    }

    #[test]
    fn merge_without_force_keeps_existing() {
        let registry = AccountRegistry::new(Platform::Messenger);
        assert!(registry.merge(Account::page("1", "Old"), false));
        assert!(!registry.merge(Account::page("1", "New"), false));
        assert_eq!(registry.get("1").unwrap().name, "Old");
        assert!(!registry.merge(Account::page("1", "New"), true));
        assert_eq!(registry.get("1").unwrap().name, "New");
    }

    #[test]
    fn wrong_platform_is_ignored() {
        let registry = AccountRegistry::new(Platform::Messenger);
        assert!(!registry.merge(Account::business("1", "Acme"), false));
        assert!(registry.is_empty());
    }

    #[test]
    fn moving_phone_reassigns_owner() {
        let registry = AccountRegistry::new(Platform::WhatsApp);
        registry.merge(Account::business("a", "A").with_phone(phone("p")), false);
        registry.merge(Account::business("b", "B").with_phone(phone("p")), true);
        assert_eq!(registry.lookup("p").unwrap().id, "b");
        assert!(registry.get("a").unwrap().phone_numbers().is_empty());

        registry.delete(&["a".into()]);
        assert_eq!(registry.lookup("p").unwrap().id, "b");
    }

    #[test]
    fn unforced_merge_leaves_owned_phone_alone() {
        let registry = AccountRegistry::new(Platform::WhatsApp);
        registry.merge(Account::business("a", "A").with_phone(phone("p")), true);
        assert!(registry.merge(Account::business("b", "B").with_phone(phone("p")), false));
        assert_eq!(registry.lookup("p").unwrap().id, "a");
        assert_eq!(registry.get("a").unwrap().phone_numbers().len(), 1);
        assert!(registry.get("b").unwrap().phone_numbers().is_empty());
    }

    #[test]
    fn resolve_reports_every_missing_id() {
        let registry = AccountRegistry::new(Platform::Messenger);
        registry.merge(Account::page("1", "A"), false);
        let err = registry
            .resolve(&["1".into(), "2".into(), "3".into()])
            .unwrap_err();
        match err {
            Error::NotFound { ids } => assert_eq!(ids, vec!["2", "3"]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn authorized_by_survives_forced_merge_without_it() {
        let registry = AccountRegistry::new(Platform::Messenger);
        let mut page = Account::page("1", "A");
        page.authorized_by = Some("u1".into());
        registry.merge(page, false);
        registry.merge(Account::page("1", "A2"), true);
        assert_eq!(registry.get("1").unwrap().authorized_by.as_deref(), Some("u1"));
    }
}
