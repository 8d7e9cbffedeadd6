use crate::{Connection, QueryResult, UnitOfWorkError, UnitOfWorkResult};

/// Run `query` on a connection inside a unit of work and collect its rows.
///
/// The query string is sent as-is, without parameter binding, so callers
/// must only pass trusted statements. A failure surfaces as
/// [`UnitOfWorkError::Query`]; returning it from the unit-of-work closure
/// rolls the transaction back.
pub async fn fetch_all<C>(connection: &mut C, query: &str) -> UnitOfWorkResult<QueryResult>
where
    C: Connection,
{
    tracing::debug!(query, "executing query");

    match connection.fetch_all(query).await {
        Ok(result) => {
            tracing::debug!(
                columns = result.columns().len(),
                rows = result.len(),
                "query returned"
            );
            Ok(result)
        }
        Err(source) => {
            tracing::warn!(query, error = %source, "query failed");
            Err(UnitOfWorkError::Query {
                query: query.to_string(),
                source,
            })
        }
    }
}
