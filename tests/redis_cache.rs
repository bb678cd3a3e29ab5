//! Redis backend checks against a running server.
//!
//! Marked `#[ignore]`; set `REDIS_URL` (default `redis://127.0.0.1:6379`)
//! and run with `--ignored`.

use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use inkpost::cache::{CacheKey, PostCache, RedisCache};
use inkpost::domain::posts::{Endpoint, Owner, PostTitle};

async fn connect() -> RedisCache {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
    RedisCache::connect(&url, Duration::from_secs(60))
        .await
        .expect("redis should be reachable")
}

fn unique_owner() -> Owner {
    Owner::new(format!("r{}", Uuid::new_v4().simple())).expect("owner")
}

fn endpoint(owner: &Owner, n: usize) -> CacheKey {
    CacheKey::Endpoint(Endpoint::for_post(
        owner,
        &PostTitle::parse(&format!("Post {n}")).expect("title"),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn clones_serve_concurrent_requests() {
    let cache = connect().await;
    let owner = unique_owner();

    let writes = (0..32).map(|n| {
        let cache = cache.clone();
        let key = endpoint(&owner, n);
        tokio::spawn(async move { cache.set(&key, &format!("<p>{n}</p>")).await })
    });
    for joined in join_all(writes).await {
        joined.expect("task").expect("set");
    }

    let reads = (0..32).map(|n| {
        let cache = cache.clone();
        let key = endpoint(&owner, n);
        tokio::spawn(async move { (n, cache.get(&key).await) })
    });
    for joined in join_all(reads).await {
        let (n, value) = joined.expect("task");
        assert_eq!(value.expect("get"), Some(format!("<p>{n}</p>")));
    }

    let removed = cache
        .delete_prefix(&Endpoint::owner_prefix(&owner))
        .await
        .expect("delete prefix");
    assert_eq!(removed, 32);
    assert_eq!(cache.get(&endpoint(&owner, 0)).await.expect("get"), None);
}
