//! Board view: a board's columns with their tasks, in render order.
//!
//! Columns follow the board's declared order. Inside a column tasks are ordered
//! by creation time, then id, so the same data always projects the same way.
//! Tasks whose column the board does not declare are collected into a trailing
//! `Unassigned` column.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

pub use super::schema::FALLBACK_COLUMN;
use super::schema::{parse_timestamp, Board, Task};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardColumn {
    pub name: String,
    pub tasks: Vec<Task>,
    /// Set only on the `Unassigned` bucket
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardWithTasks {
    pub board: Board,
    pub columns: Vec<BoardColumn>,
}

/// Creation order with id as tie-break.
///
/// Parsable `created` values sort chronologically and before unparsable ones,
/// which sort by raw text.
pub fn task_order(a: &Task, b: &Task) -> Ordering {
    let by_created = match (parse_timestamp(&a.created), parse_timestamp(&b.created)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.created.cmp(&b.created),
    };
    by_created.then_with(|| a.id.cmp(&b.id))
}

/// Group a board's tasks into its columns.
///
/// `tasks` must already be limited to tasks whose `board` is this board; their
/// incoming order does not matter.
pub fn build<'a>(board: &Board, tasks: impl IntoIterator<Item = &'a Task>) -> BoardWithTasks {
    let mut tasks: Vec<&Task> = tasks.into_iter().collect();
    tasks.sort_by(|a, b| task_order(a, b));

    let mut by_col: HashMap<&str, Vec<Task>> = HashMap::new();
    let mut unplaced = Vec::new();
    for task in tasks {
        if board.columns.iter().any(|c| c == &task.column) {
            by_col
                .entry(task.column.as_str())
                .or_default()
                .push(task.clone());
        } else {
            unplaced.push(task.clone());
        }
    }

    let mut columns: Vec<BoardColumn> = board
        .columns
        .iter()
        .map(|name| BoardColumn {
            name: name.clone(),
            tasks: by_col.remove(name.as_str()).unwrap_or_default(),
            fallback: false,
        })
        .collect();

    if !unplaced.is_empty() {
        columns.push(BoardColumn {
            name: FALLBACK_COLUMN.to_string(),
            tasks: unplaced,
            fallback: true,
        });
    }

    BoardWithTasks {
        board: board.clone(),
        columns,
    }
}
