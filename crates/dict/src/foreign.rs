use std::fmt;

use common::types::TableName;
use itertools::Itertools;

/// Referential action flags, packed into the upper byte of the
/// SYS_FOREIGN.N_COLS column.
#[derive(Clone, Copy, PartialEq, Eq, Default, derive_more::From)]
pub struct ForeignActions(pub u32);

impl ForeignActions {
    pub const DELETE_CASCADE: u32 = 1;
    pub const DELETE_SET_NULL: u32 = 1 << 1;
    pub const UPDATE_CASCADE: u32 = 1 << 2;
    pub const UPDATE_SET_NULL: u32 = 1 << 3;
    pub const DELETE_NO_ACTION: u32 = 1 << 4;
    pub const UPDATE_NO_ACTION: u32 = 1 << 5;
    const ALL: u32 = 0x3F;

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    pub fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    /// Any action that writes NULL into the child row.
    pub fn has_set_null(self) -> bool {
        self.0 & (Self::DELETE_SET_NULL | Self::UPDATE_SET_NULL) != 0
    }

    /// Any action that mutates the child row at all.
    pub fn modifies_child(self) -> bool {
        self.0
            & (Self::DELETE_CASCADE
                | Self::DELETE_SET_NULL
                | Self::UPDATE_CASCADE
                | Self::UPDATE_SET_NULL)
            != 0
    }
}

impl fmt::Debug for ForeignActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignActions({:#x})", self.0)
    }
}

/// One foreign-key constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    /// Qualified constraint id, `database/constraint_name`.
    pub id: String,
    pub foreign_table: TableName,
    pub foreign_cols: Vec<String>,
    /// Name of the index on the child table enforcing the constraint,
    /// bound during installation.
    pub foreign_index: Option<String>,
    pub referenced_table: TableName,
    pub referenced_cols: Vec<String>,
    pub referenced_index: Option<String>,
    pub actions: ForeignActions,
}

impl ForeignKey {
    pub fn n_fields(&self) -> usize {
        debug_assert_eq!(self.foreign_cols.len(), self.referenced_cols.len());
        self.foreign_cols.len()
    }

    /// The SYS_FOREIGN.N_COLS packing: field count in the low 24 bits,
    /// action flags in the upper byte.
    pub fn packed_n_cols(&self) -> u32 {
        (self.n_fields() as u32) | (self.actions.raw() << 24)
    }

    pub fn unpack_n_cols(packed: u32) -> anyhow::Result<(usize, ForeignActions)> {
        let actions = packed >> 24;
        anyhow::ensure!(
            actions & !ForeignActions::ALL == 0,
            "Unknown foreign action bits {actions:#x}"
        );
        Ok(((packed & 0x00FF_FFFF) as usize, ForeignActions(actions)))
    }

    /// Unqualified constraint name, for diagnostics.
    pub fn display_name(&self) -> &str {
        self.id.rsplit_once('/').map_or(&*self.id, |(_, name)| name)
    }

    /// Reconstructed constraint definition, used when reporting duplicate
    /// or invalid constraints.
    pub fn definition(&self) -> String {
        let mut def = format!(
            "CONSTRAINT `{}` FOREIGN KEY ({}) REFERENCES `{}` ({})",
            self.display_name(),
            quoted_list(&self.foreign_cols),
            self.referenced_table,
            quoted_list(&self.referenced_cols),
        );
        if self.actions.contains(ForeignActions::DELETE_CASCADE) {
            def.push_str(" ON DELETE CASCADE");
        }
        if self.actions.contains(ForeignActions::DELETE_SET_NULL) {
            def.push_str(" ON DELETE SET NULL");
        }
        if self.actions.contains(ForeignActions::DELETE_NO_ACTION) {
            def.push_str(" ON DELETE NO ACTION");
        }
        if self.actions.contains(ForeignActions::UPDATE_CASCADE) {
            def.push_str(" ON UPDATE CASCADE");
        }
        if self.actions.contains(ForeignActions::UPDATE_SET_NULL) {
            def.push_str(" ON UPDATE SET NULL");
        }
        if self.actions.contains(ForeignActions::UPDATE_NO_ACTION) {
            def.push_str(" ON UPDATE NO ACTION");
        }
        def
    }
}

fn quoted_list(names: &[String]) -> String {
    names.iter().map(|name| format!("`{name}`")).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk() -> ForeignKey {
        ForeignKey {
            id: "db/fk1".to_owned(),
            foreign_table: "db/t".parse().unwrap(),
            foreign_cols: vec!["a".to_owned(), "b".to_owned()],
            foreign_index: None,
            referenced_table: "db/u".parse().unwrap(),
            referenced_cols: vec!["x".to_owned(), "y".to_owned()],
            referenced_index: None,
            actions: ForeignActions::default()
                .with(ForeignActions::DELETE_CASCADE | ForeignActions::UPDATE_SET_NULL),
        }
    }

    #[test]
    fn test_n_cols_packing_roundtrip() {
        let fk = fk();
        let packed = fk.packed_n_cols();
        let (n_fields, actions) = ForeignKey::unpack_n_cols(packed).unwrap();
        assert_eq!(n_fields, 2);
        assert_eq!(actions, fk.actions);
        assert!(ForeignKey::unpack_n_cols(0xFF00_0002).is_err());
    }

    #[test]
    fn test_definition_reconstruction() {
        assert_eq!(
            fk().definition(),
            "CONSTRAINT `fk1` FOREIGN KEY (`a`, `b`) REFERENCES `db/u` (`x`, `y`) \
             ON DELETE CASCADE ON UPDATE SET NULL"
        );
    }

    #[test]
    fn test_set_null_detection() {
        assert!(fk().actions.has_set_null());
        assert!(!ForeignActions::default()
            .with(ForeignActions::DELETE_NO_ACTION)
            .has_set_null());
    }
}
