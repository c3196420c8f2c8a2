//! Test fixtures and cupboard helpers.

use cupboard_core::{Config, Crumb, Cupboard, Durability, Entity, Link, Property, TableName, Trail};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// An attached cupboard over a temporary directory.
///
/// Dereferences to [`Cupboard`]. The directory is removed when the fixture
/// is dropped.
pub struct TestCupboard {
    /// The cupboard instance.
    pub cupboard: Cupboard,
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TestCupboard {
    /// Creates a cupboard with immediate durability.
    pub fn new() -> Self {
        Self::with_durability(Durability::Immediate)
    }

    /// Creates a cupboard with deferred durability.
    pub fn deferred() -> Self {
        Self::with_durability(Durability::Deferred)
    }

    /// Creates a cupboard with the given durability.
    pub fn with_durability(durability: Durability) -> Self {
        Self::prepared(durability, |_| {})
    }

    /// Creates a cupboard after `prepare` has written into the empty data
    /// directory, e.g. hand-made ledger lines.
    pub fn prepared(durability: Durability, prepare: impl FnOnce(&Path)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        prepare(temp_dir.path());
        let config = Config::new(temp_dir.path()).durability(durability);
        let cupboard = Cupboard::new();
        cupboard
            .attach(config.clone())
            .expect("Failed to attach cupboard");
        Self {
            cupboard,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the data directory.
    pub fn path(&self) -> &Path {
        self._temp_dir.path()
    }

    /// Detaches and attaches again over the same directory, rebuilding the
    /// cache from the ledgers.
    pub fn reattach(&mut self) {
        self.cupboard.detach().expect("Failed to detach cupboard");
        self.cupboard
            .attach(self.config.clone())
            .expect("Failed to reattach cupboard");
    }

    /// Returns the non-empty lines of a table's ledger.
    pub fn ledger_lines(&self, table: TableName) -> Vec<String> {
        ledger_lines(self.path(), table)
    }
}

impl Default for TestCupboard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestCupboard {
    type Target = Cupboard;

    fn deref(&self) -> &Self::Target {
        &self.cupboard
    }
}

/// Returns the non-empty lines of a table's ledger in `dir`.
pub fn ledger_lines(dir: &Path, table: TableName) -> Vec<String> {
    fs::read_to_string(dir.join(table.ledger_file()))
        .expect("Failed to read ledger")
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes `lines` as the ledger of `table` in `dir`.
pub fn write_ledger(dir: &Path, table: TableName, lines: &[&str]) {
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(dir.join(table.ledger_file()), content).expect("Failed to write ledger");
}

/// A crumb payload with the given name and state.
pub fn crumb(name: &str, state: &str) -> Crumb {
    Crumb {
        name: name.to_string(),
        state: state.to_string(),
        ..Default::default()
    }
}

/// A trail payload with the given state.
pub fn trail(state: &str) -> Trail {
    Trail {
        state: state.to_string(),
        ..Default::default()
    }
}

/// A link payload.
pub fn link(link_type: &str, from_id: &str, to_id: &str) -> Link {
    Link {
        link_type: link_type.to_string(),
        from_id: from_id.to_string(),
        to_id: to_id.to_string(),
        ..Default::default()
    }
}

/// A property payload.
pub fn property(name: &str, value_type: &str) -> Property {
    Property {
        name: name.to_string(),
        value_type: value_type.to_string(),
        ..Default::default()
    }
}

/// Unwraps a crumb from a router result.
pub fn expect_crumb(entity: Entity) -> Crumb {
    entity.into_crumb().expect("Expected a crumb")
}

/// Unwraps a trail from a router result.
pub fn expect_trail(entity: Entity) -> Trail {
    entity.into_trail().expect("Expected a trail")
}

/// Returns the id of the property called `name`.
pub fn property_id(cupboard: &Cupboard, name: &str) -> String {
    let found = cupboard
        .table("properties")
        .expect("Failed to open properties")
        .fetch(&cupboard_core::Filter::new().with("name", name))
        .expect("Failed to fetch properties");
    found
        .into_iter()
        .next()
        .and_then(Entity::into_property)
        .map(|p| p.id)
        .unwrap_or_else(|| panic!("No property named {name}"))
}
