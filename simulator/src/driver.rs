use std::time::{Duration, Instant};

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sql_pool::prelude::*;
use tokio::runtime::Runtime;

use crate::args::SimConfig;
use crate::logging::EventLog;
use crate::model::{Model, Op, TaskState};
use crate::oracle::Oracle;

const SETTLE_DEADLINE: Duration = Duration::from_secs(5);

pub(crate) fn run(config: SimConfig, rng: &mut ChaCha8Rng) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| format!("failed to start runtime: {err}"))?;
    let factory = MockFactory::new();
    let pool = runtime
        .block_on(
            PoolOptions::builder("sim", PoolTarget::new("mock://sim"))
                .max_size(config.pool_size)
                .min_size(config.min_size)
                .base_interval(Duration::from_millis(5))
                .backoff_step(Duration::from_millis(5))
                .max_interval(Duration::from_millis(50))
                .status_interval(Duration::from_secs(1))
                .build(factory.clone()),
        )
        .map_err(|err| format!("failed to build pool: {err}"))?;

    let mut tasks: Vec<TaskState> = (0..config.tasks).map(|id| TaskState { id, conn: None }).collect();
    let mut model = Model::default();
    let mut events = EventLog::new(config.first_steps, config.tail_steps);

    let max_steps = config.iterations.unwrap_or(u64::MAX);
    let deadline = config.duration_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
    let started = Instant::now();

    let mut step: u64 = 0;
    while step < max_steps && deadline.is_none_or(|at| Instant::now() < at) {
        if model.outage_until.is_some_and(|until| step >= until) {
            factory.set_down(false);
            model.outage_until = None;
            events.record(format!("step={step} database back"));
        }

        let task_id = rng.random_range(0..tasks.len());
        let op = next_op(&tasks[task_id], &model, &config, rng);
        let result = runtime.block_on(apply(&pool, &factory, &mut model, &mut tasks[task_id], &op, step, &config));
        let status = pool.status();

        let conn_label = tasks[task_id]
            .conn_id()
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        events.record(format!(
            "step={step} task={task_id} op={} conn={conn_label} result={} available={} idle={}",
            op.label(),
            result.as_deref().unwrap_or("Ok"),
            status.available,
            status.idle
        ));

        if let Err(reason) = Oracle::check(&tasks, &model, &status) {
            events.dump_failure(&reason);
            return Err(reason);
        }
        step += 1;
    }

    if let Err(reason) = runtime.block_on(settle(&pool, &factory, &mut tasks, &config)) {
        events.dump_failure(&reason);
        return Err(reason);
    }

    let status = pool.status();
    tracing::info!(
        "complete: steps={} elapsed={:?} tasks={} pool_size={} handed_out={} timeouts={} opened={} retired={} handoffs={}",
        step,
        started.elapsed(),
        config.tasks,
        config.pool_size,
        model.handed_out,
        model.timeouts,
        status.opened,
        status.retired,
        status.handoffs
    );
    Ok(())
}

/// Apply one operation. `Some(note)` describes an expected non-fatal outcome.
async fn apply(
    pool: &Pool<MockFactory>,
    factory: &MockFactory,
    model: &mut Model,
    task: &mut TaskState,
    op: &Op,
    step: u64,
    config: &SimConfig,
) -> Option<String> {
    match op {
        Op::Acquire => {
            let timeout = Duration::from_millis(config.acquire_timeout_ms);
            match pool.acquire(timeout).await {
                Ok(Acquired::Ready(conn)) => {
                    model.handed_out += 1;
                    task.conn = Some(conn);
                    None
                }
                Ok(Acquired::TimedOut { waited }) => {
                    model.timeouts += 1;
                    Some(format!("timed out after {waited:?}"))
                }
                Err(err) => Some(format!("Err({err})")),
            }
        }
        Op::Release => {
            if let Some(conn) = task.conn.take() {
                pool.release(conn).await;
            }
            None
        }
        Op::Invalidate => {
            let mut conn = task.conn.take()?;
            conn.invalidate();
            model.retired.insert(conn.id());
            pool.release(conn).await;
            None
        }
        Op::CloseAndRelease => {
            let mut conn = task.conn.take()?;
            model.retired.insert(conn.id());
            let note = conn.close().await.err().map(|err| format!("Err({err})"));
            pool.release(conn).await;
            note
        }
        Op::Abandon => {
            drop(task.conn.take());
            // Let the background release run before the next invariant check.
            tokio::task::yield_now().await;
            None
        }
        Op::Refresh { reset_all } => match pool.refresh(*reset_all).await {
            Ok(opened) => Some(format!("opened {opened}")),
            Err(err) => Some(format!("Err({err})")),
        },
        Op::Outage { steps } => {
            factory.set_down(true);
            model.outage_until = Some(step + steps);
            None
        }
        Op::Sleep(ms) => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            None
        }
    }
}

/// Hand everything back, let the monitor refill, then close and check nothing leaked.
async fn settle(
    pool: &Pool<MockFactory>,
    factory: &MockFactory,
    tasks: &mut [TaskState],
    config: &SimConfig,
) -> Result<(), String> {
    factory.set_down(false);
    for task in tasks.iter_mut() {
        if let Some(conn) = task.conn.take() {
            pool.release(conn).await;
        }
    }

    let deadline = Instant::now() + SETTLE_DEADLINE;
    loop {
        let status = pool.status();
        if status.available >= config.min_size && status.idle == status.available {
            break;
        }
        if Instant::now() >= deadline {
            return Err(format!("pool never settled: {}", status.to_json()));
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    pool.close().await;
    if factory.live() != 0 {
        return Err(format!("{} connections still open after close", factory.live()));
    }
    Ok(())
}

fn next_op(task: &TaskState, model: &Model, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
    if rng.random::<f64>() < config.sleep_rate {
        return Op::Sleep(rng.random_range(1..=5));
    }

    if task.conn.is_some() {
        let weights = [
            (Op::Release, 0.80),
            (Op::Invalidate, config.invalidate_rate),
            (Op::CloseAndRelease, config.close_rate),
            (Op::Abandon, config.abandon_rate),
        ];
        return choose_weighted(&weights, rng);
    }

    let mut weights = vec![
        (Op::Acquire, 0.85),
        (Op::Refresh { reset_all: false }, config.refresh_rate),
        (Op::Refresh { reset_all: true }, config.refresh_rate / 4.0),
    ];
    if model.outage_until.is_none() {
        weights.push((Op::Outage { steps: rng.random_range(5..=50) }, config.outage_rate));
    }
    choose_weighted(&weights, rng)
}

fn choose_weighted(items: &[(Op, f64)], rng: &mut ChaCha8Rng) -> Op {
    let total: f64 = items.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return items.first().map_or(Op::Sleep(1), |(op, _)| op.clone());
    }
    let mut target = rng.random::<f64>() * total;
    for (op, weight) in items {
        let w = weight.max(0.0);
        if target <= w {
            return op.clone();
        }
        target -= w;
    }
    items.last().map_or(Op::Sleep(1), |(op, _)| op.clone())
}
