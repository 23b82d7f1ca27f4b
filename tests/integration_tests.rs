//! Integration tests for graph-ogm
//!
//! These tests require Neo4j to be running.
//! Run with: cargo test --test integration_tests

mod common;

use common::{neo4j_available, registry, test_config, Actor, Casting, Film};
use graph_ogm::cypher::{Filter, Order, Pagination};
use graph_ogm::schema::SchemaReconciler;
use graph_ogm::{shared, Ogm, OgmError};
use uuid::Uuid;

async fn connect() -> Ogm {
    Ogm::connect(&test_config(), registry())
        .await
        .expect("connect to Neo4j")
}

#[tokio::test]
async fn test_save_and_load_relationship_object() {
    if !neo4j_available().await {
        eprintln!("Skipping test: Neo4j not available");
        return;
    }
    let ogm = connect().await;
    let session = ogm.session();

    let title = format!("Heat {}", Uuid::new_v4());
    let actor = shared(Actor {
        name: "Al Pacino".into(),
        ..Default::default()
    });
    let film = shared(Film {
        title: title.clone(),
        ..Default::default()
    });
    Casting::link(&actor, &film, &["Vincent Hanna"]);
    session.save(&actor).await.unwrap();

    let films = session
        .load_all_filtered::<Film>(1, Filter::new().eq("title", title.as_str()), Vec::new(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(films.len(), 1);
    let loaded = films[0].read();
    assert_eq!(loaded.castings.len(), 1);
    let casting = loaded.castings[0].read();
    assert_eq!(casting.roles, vec!["Vincent Hanna".to_string()]);
    let start = casting.actor.clone().unwrap();
    assert_eq!(start.read().name, "Al Pacino");

    session.delete(&actor).await.unwrap();
    session.delete(&film).await.unwrap();
}

#[tokio::test]
async fn test_scalar_round_trip_and_delete() {
    if !neo4j_available().await {
        eprintln!("Skipping test: Neo4j not available");
        return;
    }
    let ogm = connect().await;
    let session = ogm.session();

    let actor = shared(Actor {
        name: format!("Round Trip {}", Uuid::new_v4()),
        ..Default::default()
    });
    session.save_depth(&actor, 0).await.unwrap();
    let key = actor.read().uuid.clone().unwrap();

    let loaded = session.load_depth::<Actor>(key.as_str(), 0).await.unwrap();
    assert_eq!(loaded.read().name, actor.read().name);

    assert_eq!(session.delete_by_key::<Actor>(key.as_str()).await.unwrap(), 1);
    assert!(matches!(
        session.load::<Actor>(key.as_str()).await,
        Err(OgmError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_resave_updates_in_place() {
    if !neo4j_available().await {
        eprintln!("Skipping test: Neo4j not available");
        return;
    }
    let ogm = connect().await;
    let session = ogm.session();

    let prefix = format!("Resave {}", Uuid::new_v4());
    let actor = shared(Actor {
        name: format!("{} a", prefix),
        ..Default::default()
    });
    session.save(&actor).await.unwrap();
    actor.write().name = format!("{} b", prefix);
    session.save(&actor).await.unwrap();

    let found = session
        .load_all_filtered::<Actor>(
            0,
            Filter::new().compare("name", graph_ogm::cypher::Comparison::StartsWith, prefix.as_str()),
            vec![Order::asc("name")],
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].read().name.ends_with(" b"));

    session.delete(&actor).await.unwrap();
}

#[tokio::test]
async fn test_create_then_list_schema() {
    if !neo4j_available().await {
        eprintln!("Skipping test: Neo4j not available");
        return;
    }
    let ogm = connect().await;
    let reconciler = SchemaReconciler::new(ogm.registry());
    let driver = ogm.drivers()[0].as_ref();

    reconciler.create(driver).await.unwrap();
    let live = reconciler.live(driver).await.unwrap().managed();
    for item in reconciler.expected() {
        assert!(live.contains(&item), "missing {}", item);
    }
}
