//! User-defined lookup tables (`attribute`/`flag`/`actionpoint`), keyed by a
//! registry of dynamically-declared keywords (spec.md §4.1, DESIGN NOTES §9).
//!
//! These tables are side-channels: straightforward per-cel value tables that
//! ride along with the core pipeline but never influence tile packing.
//! Modeled as a tagged variant per DESIGN NOTES §9 rather than one struct per
//! keyword, since the set of keywords is only known at parse time.

use std::collections::HashMap;

/// The resolved value of one user-table entry for one cel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableValue {
    /// `attribute <kw> in <table>`: a cel line `<kw> <n>` stores a raw byte.
    Attribute(u8),
    /// `flag <kw> <bits> in <table>`: cel lines name flags; their bit
    /// constants are OR-ed together into one mask per table.
    Flags(u32),
    /// `actionpoint <kw> in <tablex> <tabley>`: a cel line `<kw> <dx> <dy>`
    /// stores a signed offset pair.
    ActionPoint { dx: i32, dy: i32 },
}

/// What kind of value a declared keyword produces, and which table(s) it
/// feeds.
#[derive(Debug, Clone)]
pub enum KeywordKind {
    Attribute { table: String },
    Flag { table: String, bits: u32 },
    ActionPoint { table_x: String, table_y: String },
}

/// A declared `table <name> in <segment>`.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub segment: String,
}

/// Tracks every `table`/`attribute`/`flag`/`actionpoint` declaration seen so
/// far, and resolves cel-block keyword lines against them. The parser
/// consults this registry whenever it meets an identifier inside a cel block
/// that isn't one of the fixed cel keywords (spec.md §9).
#[derive(Debug, Clone, Default)]
pub struct KeywordRegistry {
    tables: Vec<TableDef>,
    keywords: HashMap<String, KeywordKind>,
}

impl KeywordRegistry {
    pub fn declare_table(&mut self, name: &str, segment: &str) {
        self.tables.push(TableDef {
            name: name.to_string(),
            segment: segment.to_string(),
        });
    }

    pub fn declare_attribute(&mut self, keyword: &str, table: &str) {
        self.keywords.insert(
            keyword.to_string(),
            KeywordKind::Attribute {
                table: table.to_string(),
            },
        );
    }

    pub fn declare_flag(&mut self, keyword: &str, bits: u32, table: &str) {
        self.keywords.insert(
            keyword.to_string(),
            KeywordKind::Flag {
                table: table.to_string(),
                bits,
            },
        );
    }

    pub fn declare_actionpoint(&mut self, keyword: &str, table_x: &str, table_y: &str) {
        self.keywords.insert(
            keyword.to_string(),
            KeywordKind::ActionPoint {
                table_x: table_x.to_string(),
                table_y: table_y.to_string(),
            },
        );
    }

    pub fn lookup(&self, keyword: &str) -> Option<&KeywordKind> {
        self.keywords.get(keyword)
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn is_known_keyword(&self, keyword: &str) -> bool {
        self.keywords.contains_key(keyword)
    }

    /// Every declared keyword and the table(s) it feeds, for the emitter to
    /// discover each table's value shape.
    pub fn keywords(&self) -> &HashMap<String, KeywordKind> {
        &self.keywords
    }
}

/// Per-cel accumulator of table entries: table name -> resolved value.
/// `Flags` entries are merged (OR-ed) across repeated flag lines for the
/// same table; other kinds simply overwrite (the DSL has no reason to
/// repeat an attribute/actionpoint line for the same table on one cel).
#[derive(Debug, Clone, Default)]
pub struct CelTableEntries(pub HashMap<String, TableValue>);

impl CelTableEntries {
    pub fn set_attribute(&mut self, table: &str, value: u8) {
        self.0.insert(table.to_string(), TableValue::Attribute(value));
    }

    pub fn add_flag_bits(&mut self, table: &str, bits: u32) {
        let entry = self
            .0
            .entry(table.to_string())
            .or_insert(TableValue::Flags(0));
        if let TableValue::Flags(existing) = entry {
            *existing |= bits;
        } else {
            *entry = TableValue::Flags(bits);
        }
    }

    pub fn set_action_point(&mut self, table_x: &str, table_y: &str, dx: i32, dy: i32) {
        // Action points are stored under a combined key so a cel can have
        // more than one distinct actionpoint keyword without clobbering.
        let key = format!("{}\0{}", table_x, table_y);
        self.0.insert(key, TableValue::ActionPoint { dx, dy });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_accumulate_across_lines() {
        let mut entries = CelTableEntries::default();
        entries.add_flag_bits("Flags", 0x01);
        entries.add_flag_bits("Flags", 0x04);
        assert_eq!(entries.0.get("Flags"), Some(&TableValue::Flags(0x05)));
    }

    #[test]
    fn registry_resolves_declared_keyword() {
        let mut reg = KeywordRegistry::default();
        reg.declare_table("DamageTable", "RODATA");
        reg.declare_attribute("dmg", "DamageTable");
        match reg.lookup("dmg") {
            Some(KeywordKind::Attribute { table }) => assert_eq!(table, "DamageTable"),
            _ => panic!("expected attribute keyword"),
        }
        assert!(reg.lookup("unknown").is_none());
    }
}
