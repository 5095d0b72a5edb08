//! Ownership, registration requests, and module lifecycle administration.

use crate::storage::OwnerInfo;

use super::db::TypeDefDb;
use super::errors::TypeDbResult;

impl TypeDefDb {
    // --- registration requests ---

    /// Queue a request to register a new module owned by `user_id`.
    ///
    /// The unregistered module name is read-locked while the request is
    /// appended so competing requests serialize.
    pub fn request_module_registration(&self, module: &str, user_id: &str) -> TypeDbResult<()> {
        let _guard = self.read_lock_any(module)?;
        Ok(self
            .storage
            .add_new_module_registration_request(module, user_id)?)
    }

    /// Pending registration requests. Admin only.
    pub fn get_new_module_registration_requests(
        &self,
        admin_user_id: &str,
    ) -> TypeDbResult<Vec<OwnerInfo>> {
        self.check_admin(admin_user_id)?;
        Ok(self.storage.get_new_module_registration_requests()?)
    }

    /// Materialize the requested module: bootstrap version (released, no
    /// spec) plus one owner holding the change-owners privilege.
    pub fn approve_module_registration_request(
        &self,
        admin_user_id: &str,
        module: &str,
    ) -> TypeDbResult<()> {
        self.check_admin(admin_user_id)?;
        let _write = self.write_lock(module)?;
        let owner = self
            .storage
            .get_owner_for_new_module_registration_request(module)?;
        let bootstrap = self.storage.init_module_info_record(module)?;
        self.storage.add_owner_to_module(module, &owner, true)?;
        self.storage.set_module_release_version(module, bootstrap)?;
        self.storage
            .remove_new_module_registration_request(module, &owner)?;
        Ok(())
    }

    /// Drop a pending registration request. Admin only.
    pub fn refuse_module_registration_request(
        &self,
        admin_user_id: &str,
        module: &str,
    ) -> TypeDbResult<()> {
        self.check_admin(admin_user_id)?;
        let _write = self.write_lock(module)?;
        let owner = self
            .storage
            .get_owner_for_new_module_registration_request(module)?;
        self.storage
            .remove_new_module_registration_request(module, &owner)?;
        Ok(())
    }

    // --- owners ---

    /// Owners of a module.
    pub fn get_module_owners(&self, module: &str) -> TypeDbResult<Vec<String>> {
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        Ok(self
            .storage
            .get_owners_for_module(module)?
            .into_keys()
            .collect())
    }

    pub fn is_owner_of_module(&self, module: &str, user_id: &str) -> TypeDbResult<bool> {
        let _guard = self.read_lock(module)?;
        self.check_module_registered(module)?;
        Ok(self
            .storage
            .get_owners_for_module(module)?
            .contains_key(user_id))
    }

    /// Grant ownership. Requires the change-owners privilege (or admin).
    pub fn add_owner_to_module(
        &self,
        known_owner_user_id: &str,
        module: &str,
        new_owner_user_id: &str,
        with_change_owners_privilege: bool,
    ) -> TypeDbResult<()> {
        self.check_user_can_change_privileges(known_owner_user_id, module)?;
        Ok(self.storage.add_owner_to_module(
            module,
            new_owner_user_id,
            with_change_owners_privilege,
        )?)
    }

    /// Revoke ownership. Requires the change-owners privilege (or admin).
    pub fn remove_owner_from_module(
        &self,
        known_owner_user_id: &str,
        module: &str,
        removed_owner_user_id: &str,
    ) -> TypeDbResult<()> {
        self.check_user_can_change_privileges(known_owner_user_id, module)?;
        Ok(self
            .storage
            .remove_owner_from_module(module, removed_owner_user_id)?)
    }

    /// Supported modules the user owns.
    pub fn get_modules_by_owner(&self, user_id: &str) -> TypeDbResult<Vec<String>> {
        let supported = self.storage.get_all_registered_modules(false)?;
        Ok(self
            .storage
            .get_modules_for_owner(user_id)?
            .into_iter()
            .filter(|module| supported.contains(module))
            .collect())
    }

    // --- module lifecycle ---

    /// Retire a module: it disappears from every read path. Admin only.
    pub fn stop_module_support(&self, module: &str, user_id: &str) -> TypeDbResult<()> {
        self.check_module_registered(module)?;
        self.check_admin(user_id)?;
        let _write = self.write_lock(module)?;
        Ok(self.storage.change_module_supported_state(module, false)?)
    }

    /// Bring a retired module back. Admin only.
    pub fn resume_module_support(&self, module: &str, user_id: &str) -> TypeDbResult<()> {
        self.check_module_registered(module)?;
        self.check_admin(user_id)?;
        let _write = self.write_lock(module)?;
        Ok(self.storage.change_module_supported_state(module, true)?)
    }

    /// Hard-delete a module and all its records. Admin only.
    pub fn remove_module(&self, module: &str, user_id: &str) -> TypeDbResult<()> {
        let _write = self.write_lock(module)?;
        self.check_admin(user_id)?;
        self.check_module_registered(module)?;
        Ok(self.storage.remove_module(module)?)
    }
}
