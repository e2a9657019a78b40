//! `datastore` commands: read and write single fields

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use mt_core::datastore::DatastoreClient;

use crate::output::print_success;

/// Parse a command line argument as JSON
pub fn parse_json(arg: &str) -> Result<Value> {
    serde_json::from_str(arg).with_context(|| format!("`{}` is not valid JSON", arg))
}

/// Parse a command line argument as a JSON object
pub fn parse_object(arg: &str) -> Result<Map<String, Value>> {
    match parse_json(arg)? {
        Value::Object(fields) => Ok(fields),
        other => bail!("expected a JSON object, got `{}`", other),
    }
}

/// Print the value of `fqfield`
pub async fn datastore_get(client: &DatastoreClient, fqfield: &str) -> Result<()> {
    let value = client.get(fqfield).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Print whether `collection/id` exists
pub async fn datastore_exists(client: &DatastoreClient, collection: &str, id: u64) -> Result<()> {
    let exists = client.exists(collection, id).await?;
    println!("{}", exists);
    Ok(())
}

/// Overwrite `fqfield` with the JSON in `value`
pub async fn datastore_set(client: &DatastoreClient, fqfield: &str, value: &str) -> Result<()> {
    let value = parse_json(value)?;
    client.set(fqfield, value).await?;
    print_success(&format!("Set {}", fqfield));
    Ok(())
}

/// Create `fqid` with the fields of the JSON object in `fields`
pub async fn datastore_create(client: &DatastoreClient, fqid: &str, fields: &str) -> Result<()> {
    let fields = parse_object(fields)?;
    client.create(fqid, fields).await?;
    print_success(&format!("Created {}", fqid));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_values() {
        assert_eq!(parse_json("\"Ada\"").unwrap(), json!("Ada"));
        assert_eq!(parse_json("42").unwrap(), json!(42));
        assert_eq!(parse_json("[1, 2]").unwrap(), json!([1, 2]));
        assert!(parse_json("Ada").is_err());
    }

    #[test]
    fn test_parse_object() {
        let fields = parse_object(r#"{"username": "admin"}"#).unwrap();
        assert_eq!(fields["username"], json!("admin"));

        let err = parse_object("[1]").unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }
}
