//! Persisted leave type table, keyed by name
use super::error::{InputError, LeaveError};
use super::leave::{LeaveType, check_identifier};

pub const LEAVE_TYPES_TREE: &str = "leave_types";

#[derive(Clone)]
pub struct LeaveCatalog {
    tree: sled::Tree,
}

impl LeaveCatalog {
    pub fn open(db: &sled::Db) -> Result<Self, LeaveError> {
        Ok(Self {
            tree: db.open_tree(LEAVE_TYPES_TREE)?,
        })
    }

    /// Register a new leave type. Names are unique and a registered type is never replaced.
    pub fn register(&self, leave_type: &LeaveType) -> Result<(), LeaveError> {
        check_identifier("leave type name", &leave_type.name)?;
        let encoded = minicbor::to_vec(leave_type)?;

        self.tree
            .compare_and_swap(leave_type.name.as_bytes(), None::<&[u8]>, Some(encoded))?
            .map_err(|_| InputError::DuplicateLeaveType(leave_type.name.clone()))?;

        tracing::info!(
            leave_type = %leave_type.name,
            max_days = leave_type.max_days,
            "leave type registered"
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<LeaveType, LeaveError> {
        let bytes = self
            .tree
            .get(name.as_bytes())?
            .ok_or_else(|| InputError::UnknownLeaveType(name.to_string()))?;

        Ok(minicbor::decode(&bytes)?)
    }

    pub fn contains(&self, name: &str) -> Result<bool, LeaveError> {
        Ok(self.tree.contains_key(name.as_bytes())?)
    }

    /// Every registered type, ordered by name.
    pub fn list(&self) -> Result<Vec<LeaveType>, LeaveError> {
        self.tree
            .iter()
            .values()
            .map(|value| -> Result<LeaveType, LeaveError> { Ok(minicbor::decode(&value?)?) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_catalog() -> (tempfile::TempDir, LeaveCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("catalog.db")).unwrap();
        (dir, LeaveCatalog::open(&db).unwrap())
    }

    #[test]
    fn register_then_get() {
        let (_dir, catalog) = temp_catalog();
        let casual = LeaveType::prospective("Casual", 6, 1);

        catalog.register(&casual).unwrap();

        assert_eq!(catalog.get("Casual").unwrap(), casual);
        assert!(catalog.contains("Casual").unwrap());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (_dir, catalog) = temp_catalog();
        catalog
            .register(&LeaveType::prospective("Casual", 6, 1))
            .unwrap();

        let err = catalog
            .register(&LeaveType::prospective("Casual", 10, 0))
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_LEAVE_TYPE");
        assert_eq!(catalog.get("Casual").unwrap().max_days, 6);
    }

    #[test]
    fn unknown_type_is_an_input_error() {
        let (_dir, catalog) = temp_catalog();
        let err = catalog.get("Sabbatical").unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_LEAVE_TYPE");
    }

    #[test]
    fn list_is_sorted_by_name() {
        let (_dir, catalog) = temp_catalog();
        catalog
            .register(&LeaveType::retroactive("Sick", 14, 14))
            .unwrap();
        catalog
            .register(&LeaveType::prospective("Casual", 6, 1))
            .unwrap();

        let names: Vec<String> = catalog.list().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Casual".to_string(), "Sick".to_string()]);
    }

    #[test]
    fn names_with_nul_are_refused() {
        let (_dir, catalog) = temp_catalog();
        let err = catalog
            .register(&LeaveType::prospective("B\0C", 3, 0))
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_IDENTIFIER");
        assert!(!catalog.contains("B\0C").unwrap());
    }
}
