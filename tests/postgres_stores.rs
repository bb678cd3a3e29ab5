//! Postgres adapter checks. Run with `DATABASE_URL` set and `--ignored`.

use inkpost::application::repos::{
    AnalyticsStore, NewVersion, ProfileDirectory, RepoError, TitleRemoval, VersionStore,
};
use inkpost::domain::posts::{Owner, PostTitle, VersionNumber};
use inkpost::infra::db::PostgresRepositories;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};

fn ids() -> (Owner, PostTitle) {
    (
        Owner::new("alice").expect("owner"),
        PostTitle::parse("Trip Notes").expect("title"),
    )
}

fn version(number: u32) -> VersionNumber {
    VersionNumber::new(number).expect("positive")
}

async fn insert(repos: &PostgresRepositories, number: u32, created_at: OffsetDateTime) {
    let (owner, title) = ids();
    repos
        .insert_active_version(NewVersion {
            owner: owner.clone(),
            title: title.clone(),
            version: version(number),
            created_at,
            content_ref: format!("alice_Trip_Notes_{number}.html"),
        })
        .await
        .expect("insert version");
    repos
        .create_post_analytics(&owner, &title, version(number), created_at)
        .await
        .expect("create analytics");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn insert_and_activate_keep_one_active_version(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (owner, title) = ids();
    let now = OffsetDateTime::now_utc();

    insert(&repos, 1, now).await;
    insert(&repos, 2, now + Duration::seconds(1)).await;

    let active = repos.active_version(&owner, &title).await.unwrap().unwrap();
    assert_eq!(active.version, "2");

    repos
        .activate_version(&owner, &title, version(1))
        .await
        .expect("activate");
    let records = repos.fetch_versions(&owner, &title).await.unwrap();
    let active: Vec<_> = records
        .iter()
        .filter(|record| record.is_active)
        .map(|record| record.version.as_str())
        .collect();
    assert_eq!(active, vec!["1"]);

    let err = repos
        .activate_version(&owner, &title, version(9))
        .await
        .expect_err("missing version");
    assert!(matches!(err, RepoError::NotFound));
    assert!(repos.is_active(&owner, &title, version(1)).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn duplicate_version_numbers_are_rejected(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let now = OffsetDateTime::now_utc();
    insert(&repos, 1, now).await;

    let (owner, title) = ids();
    let err = repos
        .insert_active_version(NewVersion {
            owner,
            title,
            version: version(1),
            created_at: now,
            content_ref: "again".into(),
        })
        .await
        .expect_err("duplicate");
    assert!(matches!(err, RepoError::Duplicate { .. }));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn likes_toggle_and_views_accumulate(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (owner, title) = ids();
    let now = OffsetDateTime::now_utc();
    insert(&repos, 1, now).await;

    let mut states = Vec::new();
    for _ in 0..3 {
        states.push(repos.toggle_like(&owner, &title, version(1), "bob").await.unwrap());
    }
    assert_eq!(states, vec![true, false, true]);

    for _ in 0..3 {
        repos
            .record_view(&owner, &title, version(1), OffsetDateTime::now_utc())
            .await
            .unwrap();
    }
    assert_eq!(repos.view_count(&owner, &title, version(1)).await.unwrap(), 3);

    let record = repos
        .get_post_analytics(&owner, &title, version(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.views.len(), 3);
    assert!(record.is_liked_by("bob"));

    let err = repos
        .record_view(&owner, &title, version(5), now)
        .await
        .expect_err("no record");
    assert!(matches!(err, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn most_viewed_orders_by_views_then_age(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (owner, title) = ids();
    let now = OffsetDateTime::now_utc();
    insert(&repos, 1, now).await;
    insert(&repos, 2, now + Duration::seconds(1)).await;
    insert(&repos, 3, now + Duration::seconds(2)).await;

    for (number, views) in [(1, 1), (2, 3), (3, 1)] {
        for _ in 0..views {
            repos
                .record_view(&owner, &title, version(number), now)
                .await
                .unwrap();
        }
    }

    let ranked: Vec<_> = repos
        .most_viewed(10)
        .await
        .unwrap()
        .into_iter()
        .map(|record| (record.version, record.view_count))
        .collect();
    assert_eq!(
        ranked,
        vec![("2".to_string(), 3), ("1".to_string(), 1), ("3".to_string(), 1)]
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn deleting_a_title_cascades_analytics(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (owner, title) = ids();
    let now = OffsetDateTime::now_utc();
    insert(&repos, 1, now).await;
    insert(&repos, 2, now).await;
    repos
        .record_view(&owner, &title, version(1), now)
        .await
        .unwrap();

    assert_eq!(repos.delete_post_analytics(&owner, &title).await.unwrap(), 2);
    let removed = repos.delete_title(&owner, &title).await.unwrap();
    assert_eq!(removed.len(), 2);
    assert!(repos.fetch_versions(&owner, &title).await.unwrap().is_empty());
    assert!(
        repos
            .get_post_analytics(&owner, &title, version(1))
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn remove_title_drops_versions_and_analytics_together(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (owner, title) = ids();
    let now = OffsetDateTime::now_utc();
    insert(&repos, 1, now).await;
    insert(&repos, 2, now).await;
    repos.toggle_like(&owner, &title, version(2), "bob").await.unwrap();

    let removed = repos.remove_title(&owner, &title).await.unwrap();

    assert_eq!(removed.len(), 2);
    assert!(repos.fetch_versions(&owner, &title).await.unwrap().is_empty());
    for number in [1, 2] {
        assert!(
            repos
                .get_post_analytics(&owner, &title, version(number))
                .await
                .unwrap()
                .is_none()
        );
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres database"]
async fn style_updates_upsert_profiles(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let (owner, _) = ids();

    assert!(repos.profile(&owner).await.unwrap().is_none());
    repos.set_style(&owner, "classic").await.unwrap();
    repos.set_style(&owner, "futuristic").await.unwrap();

    let profile = repos.profile(&owner).await.unwrap().unwrap();
    assert_eq!(profile.style.as_deref(), Some("futuristic"));
}
