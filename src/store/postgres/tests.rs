use super::*;
use crate::store::{IndexConfiguration, IndexFamily};

fn unreachable_database() -> DatabaseConfig {
    DatabaseConfig {
        host: "127.0.0.1".to_string(),
        // Reserved port, nothing listens here
        port: 1,
        connect_timeout_secs: 2,
        ..DatabaseConfig::default()
    }
}

fn session_config(family: IndexFamily) -> SessionConfig {
    SessionConfig {
        index: IndexConfiguration::new(family),
        table: TableSpec {
            name: "document_vectors".to_string(),
            dimension: 3,
        },
    }
}

#[test]
fn connect_options_follow_database_config() {
    let store = PgStore::new(
        DatabaseConfig {
            host: "db.internal".to_string(),
            port: 6543,
            name: "bench".to_string(),
            ..DatabaseConfig::default()
        },
        50,
    );

    let options = store.connect_options();
    assert_eq!(options.get_host(), "db.internal");
    assert_eq!(options.get_port(), 6543);
    assert_eq!(options.get_database(), Some("bench"));
}

#[test]
fn zero_batch_size_is_clamped() {
    let store = PgStore::new(DatabaseConfig::default(), 0);
    assert_eq!(store.insert_batch_size, 1);
}

#[tokio::test]
async fn unreachable_store_is_a_connection_error() {
    let store = PgStore::new(unreachable_database(), 100);

    let result = store.open(&session_config(IndexFamily::Hnsw)).await;

    assert!(matches!(result, Err(AnnError::Connection(_))));
}

#[tokio::test]
async fn setup_against_unreachable_store_fails_before_ddl() {
    let store = PgStore::new(unreachable_database(), 100);

    let result = store.setup(&session_config(IndexFamily::Ivfflat)).await;

    assert!(matches!(result, Err(AnnError::Connection(_))));
}

#[test]
fn index_method_from_definition() {
    assert_eq!(
        index_method(
            "CREATE INDEX hnsw_document_vectors_chunk_vector_idx ON public.document_vectors \
             USING hnsw (((chunk_vector)::halfvec(3072)) halfvec_ip_ops) WITH (m='16')"
        ),
        "hnsw"
    );
    assert_eq!(
        index_method("CREATE UNIQUE INDEX document_vectors_pkey ON public.document_vectors USING btree (id)"),
        "btree"
    );
    assert_eq!(index_method("not an index"), "unknown");
}

#[test]
fn identifiers_are_quoted() {
    assert_eq!(quote_identifier("document_vectors"), "\"document_vectors\"");
    assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
}
