use std::collections::HashMap;

use sql_pool::PoolStatus;

use crate::model::{Model, TaskState};

pub(crate) struct Oracle;

impl Oracle {
    pub(crate) fn check(tasks: &[TaskState], model: &Model, status: &PoolStatus) -> Result<(), String> {
        let mut holders = HashMap::new();
        for task in tasks {
            let Some(conn_id) = task.conn_id() else {
                continue;
            };
            if let Some(other) = holders.insert(conn_id, task.id) {
                return Err(format!(
                    "conn {conn_id} lent to task {other} and task {} at once",
                    task.id
                ));
            }
            if model.retired.contains(&conn_id) {
                return Err(format!("retired conn {conn_id} lent again to task {}", task.id));
            }
        }

        let held = holders.len();
        if held > status.max_size {
            return Err(format!("{held} connections lent, max_size is {}", status.max_size));
        }
        if status.available > status.max_size {
            return Err(format!(
                "pool counts {} connections, max_size is {}",
                status.available, status.max_size
            ));
        }
        if status.idle > status.available {
            return Err(format!(
                "{} idle connections but only {} counted",
                status.idle, status.available
            ));
        }
        if held > status.in_use {
            return Err(format!("{held} connections lent, pool reports {} in use", status.in_use));
        }
        if status.waiting != 0 {
            return Err(format!("{} wait slots left behind between steps", status.waiting));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(available: usize, idle: usize, waiting: usize) -> PoolStatus {
        PoolStatus {
            name: "sim".to_string(),
            max_size: 2,
            min_size: 1,
            available,
            idle,
            waiting,
            in_use: available.saturating_sub(idle),
            opened: 0,
            retired: 0,
            timeouts: 0,
            handoffs: 0,
            captured_at: Default::default(),
        }
    }

    #[test]
    fn empty_run_passes() {
        assert!(Oracle::check(&[], &Model::default(), &status(2, 2, 0)).is_ok());
    }

    #[test]
    fn overfull_pool_is_flagged() {
        let err = Oracle::check(&[], &Model::default(), &status(3, 1, 0)).unwrap_err();
        assert!(err.contains("max_size"));
    }

    #[test]
    fn leftover_waiters_are_flagged() {
        let err = Oracle::check(&[], &Model::default(), &status(2, 0, 1)).unwrap_err();
        assert!(err.contains("wait slots"));
    }
}
