mod common;

use std::{
    collections::HashSet,
    sync::{Arc, Barrier},
    time::Duration,
};

use common::Harness;
use sqlroute::{
    ConnectionRegistry, Connections, DEFAULT_DB_ALIAS, DatabaseConfig, Result, in_database,
    resolve_read, resolve_write,
};

#[test]
fn test_threads_see_only_their_own_route() {
    let barrier = Barrier::new(2);

    std::thread::scope(|s| {
        for alias in ["alpha", "beta"] {
            let barrier = &barrier;
            s.spawn(move || {
                let route = in_database(alias).write(true).build().unwrap();
                let guard = route.enter();

                // both routes are active at this point
                barrier.wait();
                assert_eq!(resolve_read(), alias);
                assert_eq!(resolve_write(), alias);
                barrier.wait();

                guard.exit().unwrap();
                assert_eq!(resolve_read(), DEFAULT_DB_ALIAS);
            });
        }
    });

    assert_eq!(resolve_read(), DEFAULT_DB_ALIAS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tasks_see_only_their_own_route() {
    let mut tasks = Vec::new();

    for i in 0..8 {
        tasks.push(tokio::spawn(async move {
            let alias = format!("db_{i}");
            let route = in_database(alias.as_str()).write(true).build().unwrap();

            route
                .run_async(async {
                    for _ in 0..20 {
                        tokio::task::yield_now().await;
                        assert_eq!(resolve_read(), alias);
                        assert_eq!(resolve_write(), alias);
                    }
                })
                .await;

            resolve_read()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), DEFAULT_DB_ALIAS);
    }
}

#[test]
fn test_concurrent_inline_configs_mint_unique_aliases() {
    const THREADS: usize = 16;
    let registry = Arc::new(Connections::new());
    let barrier = Barrier::new(THREADS);

    let minted: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = registry.clone();
                let barrier = &barrier;
                s.spawn(move || {
                    let route = in_database(DatabaseConfig::sqlite(":memory:"))
                        .write(true)
                        .registry(registry.clone())
                        .build()
                        .unwrap();

                    route.run(|| {
                        barrier.wait();
                        assert_eq!(registry.len(), THREADS);
                        assert_eq!(resolve_write(), route.alias());
                        barrier.wait();
                    });

                    route.alias().to_string()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<_> = minted.iter().collect();
    assert_eq!(unique.len(), THREADS);
    assert!(registry.is_empty());
}

#[test]
fn test_concurrent_writes_land_in_their_own_store() -> Result<()> {
    let h = Harness::new()?;

    std::thread::scope(|s| {
        for alias in ["default", "test"] {
            let h = &h;
            s.spawn(move || {
                let route = in_database(alias).write(true).build().unwrap();
                route.run(|| {
                    for n in 0..25 {
                        h.create(&format!("{alias}-{n}")).unwrap();
                    }
                });
            });
        }
    });

    assert_eq!(h.count_in("default")?, 25);
    assert_eq!(h.count_in("test")?, 25);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_future_still_releases() {
    let registry = Arc::new(Connections::new());
    let route = in_database(DatabaseConfig::sqlite(":memory:"))
        .registry(registry.clone())
        .build()
        .unwrap();
    assert_eq!(registry.len(), 1);

    let outcome = tokio::time::timeout(
        Duration::from_millis(10),
        route.run_async(tokio::time::sleep(Duration::from_secs(3600))),
    )
    .await;

    assert!(outcome.is_err());
    assert!(route.is_released());
    assert!(registry.is_empty());
    assert_eq!(resolve_read(), DEFAULT_DB_ALIAS);
}

#[tokio::test]
async fn test_joined_futures_on_one_thread_stay_isolated() {
    let alpha = in_database("alpha").write(true).build().unwrap();
    let beta = in_database("beta").build().unwrap();

    let (seen_alpha, seen_beta, seen_plain) = tokio::join!(
        alpha.run_async(async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            (resolve_read(), resolve_write())
        }),
        beta.run_async(async {
            tokio::task::yield_now().await;
            (resolve_read(), resolve_write())
        }),
        async {
            tokio::task::yield_now().await;
            resolve_read()
        }
    );

    assert_eq!(seen_alpha, ("alpha".to_string(), "alpha".to_string()));
    assert_eq!(seen_beta, ("beta".to_string(), DEFAULT_DB_ALIAS.to_string()));
    assert_eq!(seen_plain, DEFAULT_DB_ALIAS);
    assert_eq!(resolve_read(), DEFAULT_DB_ALIAS);
}
