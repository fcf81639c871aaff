use duel_ingest::{Key, Record};
use itertools::Itertools;
use std::fmt;

/// Where a `SAVE` command writes the store's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// flat text dump at the store's configured dump location
    Csv,
    /// binary snapshot, the store appends its own extension
    File(String),
}

/// Commands of the store's text protocol. Each one travels as the path of a single GET request.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    Insert {
        fields: Vec<(String, String)>,
        timestamp: Key,
    },
    PointQuery {
        key: Key,
    },
    RangeQuery {
        low: Key,
        high: Key,
    },
    Remove {
        key: Key,
    },
    Load {
        name: String,
    },
    Save {
        target: SaveTarget,
    },
}

impl StoreCommand {
    pub fn insert(record: &Record, columns: &[String]) -> Self {
        Self::Insert {
            fields: record
                .fields(columns)
                .map(|(column, value)| (column.to_owned(), value.to_string()))
                .collect(),
            timestamp: record.key,
        }
    }

    /// Render the command as it appears on the wire
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert { fields, timestamp } => write!(
                f,
                "INSERT::{}::TIMESTAMP={timestamp}::HIDE",
                fields
                    .iter()
                    .map(|(column, value)| format!("{column}={value}"))
                    .join(",")
            ),
            Self::PointQuery { key } => write!(f, "LIST::ONE::{key}::HIDE"),
            // the store splits commands on `::` and reads the bounds from the third segment
            Self::RangeQuery { low, high } => write!(f, "LIST::RANGE::{low},{high}::HIDE"),
            Self::Remove { key } => write!(f, "REMOVE::ONE::TIMESTAMP={key}::HIDE"),
            Self::Load { name } => write!(f, "LOAD::{name}"),
            Self::Save {
                target: SaveTarget::Csv,
            } => f.write_str("SAVE::CSV"),
            Self::Save {
                target: SaveTarget::File(name),
            } => write!(f, "SAVE::{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duel_ingest::Value;

    #[test]
    fn insert_keeps_column_order() {
        let columns = vec!["store".to_owned(), "item".to_owned(), "sales".to_owned()];
        let record = Record::new(
            1_356_998_400_000,
            vec![Value::Integer(1), Value::Integer(1), Value::Integer(13)],
        );

        assert_eq!(
            StoreCommand::insert(&record, &columns).to_wire(),
            "INSERT::store=1,item=1,sales=13::TIMESTAMP=1356998400000::HIDE"
        );
    }

    #[test]
    fn insert_formats_mixed_values() {
        let columns = vec!["price".to_owned(), "label".to_owned()];
        let record = Record::new(5, vec![Value::Real(2.5), Value::Text("x".to_owned())]);

        assert_eq!(
            StoreCommand::insert(&record, &columns).to_wire(),
            "INSERT::price=2.5,label=x::TIMESTAMP=5::HIDE"
        );
    }

    #[test]
    fn query_and_remove() {
        assert_eq!(
            StoreCommand::PointQuery { key: 42 }.to_wire(),
            "LIST::ONE::42::HIDE"
        );
        assert_eq!(
            StoreCommand::RangeQuery { low: 10, high: 99 }.to_wire(),
            "LIST::RANGE::10,99::HIDE"
        );
        assert_eq!(
            StoreCommand::Remove { key: 7 }.to_wire(),
            "REMOVE::ONE::TIMESTAMP=7::HIDE"
        );
    }

    #[test]
    fn persistence_commands() {
        assert_eq!(
            StoreCommand::Load {
                name: "empty.r2d2".to_owned()
            }
            .to_wire(),
            "LOAD::empty.r2d2"
        );
        assert_eq!(
            StoreCommand::Save {
                target: SaveTarget::Csv
            }
            .to_wire(),
            "SAVE::CSV"
        );
        assert_eq!(
            StoreCommand::Save {
                target: SaveTarget::File("test_100".to_owned())
            }
            .to_wire(),
            "SAVE::test_100"
        );
    }
}
