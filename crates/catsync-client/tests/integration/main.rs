//! Integration tests for catsync-client
//!
//! Uses wiremock to simulate the catalog REST API and verifies request
//! shape, response decoding and error mapping of the CatalogClient.


mod test_errors;
mod test_upsert;
