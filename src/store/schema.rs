// DDL for chunk tables and their ANN indexes
// Every statement is idempotent so setup can be re-run against a live database

use super::{IndexConfiguration, IndexFamily, TableSpec, VectorPrecision};

pub const CREATE_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS vector";

#[inline]
pub fn create_table(table: &TableSpec) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {name} (
            id SERIAL PRIMARY KEY,
            file_name TEXT NOT NULL,
            document_page SMALLINT NOT NULL,
            chunk_no INTEGER NOT NULL,
            chunk_text TEXT NOT NULL,
            model TEXT,
            prompt_tokens INTEGER,
            total_tokens INTEGER,
            created_date_time TIMESTAMPTZ,
            chunk_vector vector({dimension}) NOT NULL,
            business_category TEXT
        )
        "#,
        name = table.name,
        dimension = table.dimension,
    )
}

#[inline]
pub fn index_name(table: &str, family: IndexFamily) -> String {
    format!("{}_{}_chunk_vector_idx", family.as_str(), table)
}

/// Index DDL for the configured family, `None` when the family needs no index
#[inline]
pub fn create_index(index: &IndexConfiguration, table: &TableSpec) -> Option<String> {
    let expression = format!(
        "(chunk_vector::{})",
        VectorPrecision::for_family(index.family).type_name(table.dimension)
    );
    let name = index_name(&table.name, index.family);

    match index.family {
        IndexFamily::None => None,
        IndexFamily::Hnsw => Some(format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {table} \
             USING hnsw ({expression} halfvec_ip_ops) \
             WITH (m = {m}, ef_construction = {ef})",
            name = name,
            table = table.name,
            expression = expression,
            m = index.hnsw_m,
            ef = index.hnsw_ef_construction,
        )),
        IndexFamily::Ivfflat => Some(format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {table} \
             USING ivfflat ({expression} halfvec_ip_ops) \
             WITH (lists = {lists})",
            name = name,
            table = table.name,
            expression = expression,
            lists = index.ivfflat_lists,
        )),
    }
}

/// Parameterized insert for one chunk, the vector bound as a text literal
#[inline]
pub fn insert_chunk(table: &TableSpec) -> String {
    format!(
        "INSERT INTO {name} \
         (file_name, document_page, chunk_no, chunk_text, model, prompt_tokens, \
          total_tokens, created_date_time, chunk_vector, business_category) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::vector({dimension}), $10)",
        name = table.name,
        dimension = table.dimension,
    )
}

#[inline]
pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableSpec {
        TableSpec {
            name: "document_vectors".to_string(),
            dimension: 3072,
        }
    }

    #[test]
    fn table_ddl_is_idempotent() {
        let ddl = create_table(&table());
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS document_vectors"));
        assert!(ddl.contains("chunk_vector vector(3072) NOT NULL"));
        assert!(ddl.contains("document_page SMALLINT"));
    }

    #[test]
    fn no_index_for_sequential_scan() {
        assert_eq!(
            create_index(&IndexConfiguration::new(IndexFamily::None), &table()),
            None
        );
    }

    #[test]
    fn hnsw_index_uses_half_precision_inner_product() {
        let mut index = IndexConfiguration::new(IndexFamily::Hnsw);
        index.hnsw_m = 24;
        index.hnsw_ef_construction = 100;

        let ddl = create_index(&index, &table()).expect("hnsw needs an index");
        assert!(ddl.starts_with(
            "CREATE INDEX IF NOT EXISTS hnsw_document_vectors_chunk_vector_idx ON document_vectors"
        ));
        assert!(ddl.contains("USING hnsw ((chunk_vector::halfvec(3072)) halfvec_ip_ops)"));
        assert!(ddl.contains("WITH (m = 24, ef_construction = 100)"));
    }

    #[test]
    fn ivfflat_index_uses_lists() {
        let mut index = IndexConfiguration::new(IndexFamily::Ivfflat);
        index.ivfflat_lists = 250;

        let ddl = create_index(&index, &table()).expect("ivfflat needs an index");
        assert!(ddl.contains("ivfflat_document_vectors_chunk_vector_idx"));
        assert!(ddl.contains("USING ivfflat ((chunk_vector::halfvec(3072)) halfvec_ip_ops)"));
        assert!(ddl.ends_with("WITH (lists = 250)"));
    }

    #[test]
    fn insert_binds_ten_columns() {
        let sql = insert_chunk(&table());
        assert!(sql.contains("$9::vector(3072)"));
        assert!(sql.contains("$10)"));
    }
}
