use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use rusqlite::Connection;

use rust_sqlite_orm::{
    table_spec, AsyncOrm, AsyncOrmWorker, ConflictMode, CreateTableOptions, IndexDefinition,
    OrderDirection, Orm, OrmError, OrmWorker, Query, QueryOperator, ReadOperation,
    UpdateOperation, Value,
};

table_spec! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Event {
        pub id: i64 => ["PRIMARY KEY"],
        pub source: String => ["NOT NULL"],
        pub payload: Option<Vec<u8>>,
        pub weight: f64 => [("DEFAULT", "0")],
    }
}

fn event(id: i64) -> Event {
    Event {
        id,
        source: format!("sensor_{}", id % 3),
        payload: (id % 2 == 0).then(|| id.to_le_bytes().to_vec()),
        weight: id as f64 * 1.5,
    }
}

// Helper function to start a worker over an in-memory database with the table created
fn spawn_worker(thread_name: &str) -> Result<OrmWorker<Event>> {
    let orm = Orm::<Event>::new(Connection::open_in_memory()?, "events")?;
    let worker = OrmWorker::spawn(orm, thread_name)?;
    worker.create_table(CreateTableOptions::new())?;
    Ok(worker)
}

#[tokio::test]
async fn test_blocking_worker() {
    test_blocking_worker_impl().unwrap();
}

fn test_blocking_worker_impl() -> Result<()> {
    let worker = spawn_worker("events-worker")?;
    assert_eq!(worker.name(), "events-worker");

    worker.create_index(IndexDefinition::new("events_source_idx", ["source"]))?;
    assert_eq!(worker.insert_entry(event(1), ConflictMode::Abort)?, 1);
    assert_eq!(
        worker.insert_entries((2..=9).map(event).collect(), ConflictMode::Abort)?,
        8
    );
    let err = worker.insert_entry(event(1), ConflictMode::Abort).unwrap_err();
    assert!(err.is_constraint_violation());

    let from_sensor_0 = Query::new().with_eq("source", "sensor_0");
    assert_eq!(worker.count_entries(from_sensor_0.clone())?, 3);

    let rows = worker.select_entries(
        ReadOperation::new()
            .with_query(from_sensor_0)
            .order_by("id", OrderDirection::Desc),
    )?;
    assert_eq!(rows, vec![event(9), event(6), event(3)]);

    let update = UpdateOperation::new()
        .set("weight", 0.0)
        .with_query(Query::new().with_condition("payload", QueryOperator::IsNull));
    assert_eq!(worker.update_entries(update)?, 5);

    let removed = worker.delete_entries_returning(Query::new().with_eq("id", 2))?;
    assert_eq!(removed, vec![event(2)]);
    assert_eq!(worker.delete_entries(Query::new())?, 8);

    worker.shutdown()?;
    Ok(())
}

#[tokio::test]
async fn test_submit_raw_job() {
    test_submit_raw_job_impl().unwrap();
}

fn test_submit_raw_job_impl() -> Result<()> {
    let worker = spawn_worker("events-raw")?;
    worker.insert_entries((1..=3).map(event).collect(), ConflictMode::Abort)?;

    let total: f64 = worker
        .submit(|orm| {
            let total: f64 = orm
                .connection()
                .query_row("SELECT sum(weight) FROM events", [], |row| row.get(0))?;
            Ok(total)
        })?
        .wait()?;
    assert_eq!(total, 9.0);
    Ok(())
}

#[tokio::test]
async fn test_select_stream() -> Result<()> {
    let worker = spawn_worker("events-stream")?;
    worker.insert_entries((1..=100).map(event).collect(), ConflictMode::Abort)?;

    let stream = worker.select_stream(ReadOperation::new().order_by("id", OrderDirection::Asc))?;
    let ids: Vec<i64> = stream
        .map(|entry| entry.map(|e| e.id))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<rust_sqlite_orm::Result<_>>()?;
    assert_eq!(ids, (1..=100).collect::<Vec<_>>());

    // dropping a stream early leaves the worker usable
    let mut partial = worker.select_stream(ReadOperation::new())?;
    assert!(partial.next().await.is_some());
    drop(partial);
    assert_eq!(worker.count_entries(Query::new())?, 100);

    let mut failing =
        worker.select_stream(ReadOperation::new().with_query(Query::new().with_eq("missing", 1)))?;
    assert!(matches!(failing.next().await, Some(Err(OrmError::Declaration(_)))));
    assert!(failing.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_held_stream_does_not_block_worker() -> Result<()> {
    let worker = spawn_worker("events-held")?;
    worker.insert_entries((1..=200).map(event).collect(), ConflictMode::Abort)?;

    let stream = worker.select_stream(ReadOperation::new().order_by("id", OrderDirection::Asc))?;
    // the stream is not polled yet; the next job must still run
    assert_eq!(worker.count_entries(Query::new())?, 200);
    assert_eq!(worker.insert_entry(event(201), ConflictMode::Abort)?, 1);

    let entries = stream.collect::<Vec<_>>().await;
    assert_eq!(entries.len(), 200);
    assert_eq!(entries.last().map(|e| e.as_ref().map(|e| e.id).ok()), Some(Some(200)));
    Ok(())
}

#[tokio::test]
async fn test_async_worker() -> Result<()> {
    let orm = Orm::<Event>::new(Connection::open_in_memory()?, "events")?;
    let worker = Arc::new(AsyncOrmWorker::spawn(orm, "events-async")?);

    worker.create_table(CreateTableOptions::new().allow_existed(true)).await?;
    worker
        .create_index(IndexDefinition::new("events_weight_idx", ["weight"]).unique(true))
        .await?;

    let mut tasks = Vec::new();
    for chunk in 0..4i64 {
        let worker = Arc::clone(&worker);
        tasks.push(tokio::spawn(async move {
            let entries = (chunk * 10 + 1..=chunk * 10 + 10).map(event).collect();
            worker.insert_entries(entries, ConflictMode::Abort).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await??, 10);
    }

    assert_eq!(worker.count_entries(Query::new()).await?, 40);
    assert_eq!(worker.insert_entry(event(1), ConflictMode::Ignore).await?, 0);

    let heavy = Query::new().with_condition("weight", QueryOperator::GreaterThan(Value::Real(57.0)));
    let rows = worker
        .select_entries(ReadOperation::new().with_query(heavy.clone()).order_by("id", OrderDirection::Asc))
        .await?;
    assert_eq!(rows, vec![event(39), event(40)]);

    let update = UpdateOperation::new().set("source", "archived").with_query(heavy.clone());
    assert_eq!(worker.update_entries(update).await?, 2);

    let removed = worker.delete_entries_returning(heavy).await?;
    assert!(removed.iter().all(|e| e.source == "archived"));
    assert_eq!(worker.delete_entries(Query::new()).await?, 38);

    // a blocking view of the same worker
    assert_eq!(worker.worker().count_entries(Query::new())?, 0);

    match Arc::try_unwrap(worker) {
        Ok(worker) => worker.shutdown()?,
        Err(_) => panic!("worker is still shared"),
    }
    Ok(())
}

#[tokio::test]
async fn test_drop_finishes_queued_jobs() {
    let worker = spawn_worker("events-stopped").unwrap();
    let handle = worker
        .submit(|orm| orm.count_entries(&Query::new()))
        .unwrap();
    drop(worker);
    // queued jobs still finish before the thread exits
    assert_eq!(handle.await.unwrap(), 0);
}
