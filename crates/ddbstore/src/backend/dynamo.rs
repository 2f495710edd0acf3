use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
    ScalarAttributeType, TimeToLiveSpecification, TimeToLiveStatus,
};
use aws_sdk_dynamodb::Client;
use tracing::debug;

use super::{SessionBackend, TableDescription};
use crate::error::BackendError;
use crate::record::{SessionRecord, DATA_ATTRIBUTE, EXPIRATION_ATTRIBUTE, ID_ATTRIBUTE};

/// DynamoDB-backed session table access.
#[derive(Clone)]
pub struct DynamoBackend {
    client: Client,
}

impl DynamoBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential chain for `region`.
    /// `endpoint_url` points the client at DynamoDB Local or another emulator.
    pub async fn connect(region: &str, endpoint_url: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));
        if let Some(url) = endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let sdk_config = loader.load().await;
        debug!("DynamoDB client configured for region {}", region);
        Self::new(Client::new(&sdk_config))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn request_error<E>(operation: &'static str, err: E) -> BackendError
where
    E: std::error::Error,
{
    BackendError::Request {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

/// DynamoDB answers a repeated TTL update with a ValidationException.
fn ttl_already_enabled(message: &str) -> bool {
    message.contains("TimeToLive is already enabled")
}

fn build_error(operation: &'static str, err: aws_sdk_dynamodb::error::BuildError) -> BackendError {
    BackendError::Request {
        operation,
        message: err.to_string(),
    }
}

fn parse_record(id: &str, item: &HashMap<String, AttributeValue>) -> Result<SessionRecord, BackendError> {
    let malformed = |reason: &str| BackendError::MalformedRecord {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    let expiration = item
        .get(EXPIRATION_ATTRIBUTE)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(|| malformed("missing or non-numeric expiration"))?;
    let data = item
        .get(DATA_ATTRIBUTE)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| malformed("missing data"))?;

    Ok(SessionRecord {
        id: id.to_string(),
        expiration,
        data,
    })
}

#[async_trait]
impl SessionBackend for DynamoBackend {
    async fn get_item(&self, table: &str, id: &str) -> Result<Option<SessionRecord>, BackendError> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| request_error("GetItem", e))?;

        match output.item() {
            Some(item) => parse_record(id, item).map(Some),
            None => Ok(None),
        }
    }

    async fn put_item(&self, table: &str, record: &SessionRecord) -> Result<(), BackendError> {
        self.client
            .put_item()
            .table_name(table)
            .item(ID_ATTRIBUTE, AttributeValue::S(record.id.clone()))
            .item(EXPIRATION_ATTRIBUTE, AttributeValue::N(record.expiration.to_string()))
            .item(DATA_ATTRIBUTE, AttributeValue::S(record.data.clone()))
            .send()
            .await
            .map_err(|e| request_error("PutItem", e))?;
        Ok(())
    }

    async fn delete_item(&self, table: &str, id: &str) -> Result<(), BackendError> {
        self.client
            .delete_item()
            .table_name(table)
            .key(ID_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| request_error("DeleteItem", e))?;
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription, BackendError> {
        let output = match self.client.describe_table().table_name(table).send().await {
            Ok(output) => output,
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_resource_not_found_exception())
                    .unwrap_or(false);
                if not_found {
                    return Err(BackendError::TableNotFound(table.to_string()));
                }
                return Err(request_error("DescribeTable", e));
            }
        };

        let partition_key = output.table().and_then(|t| {
            t.key_schema()
                .iter()
                .find(|k| *k.key_type() == KeyType::Hash)
                .map(|k| k.attribute_name().to_string())
        });

        let ttl = self
            .client
            .describe_time_to_live()
            .table_name(table)
            .send()
            .await
            .map_err(|e| request_error("DescribeTimeToLive", e))?;
        let ttl_attribute = ttl.time_to_live_description().and_then(|d| {
            match d.time_to_live_status() {
                Some(TimeToLiveStatus::Enabled) | Some(TimeToLiveStatus::Enabling) => {
                    d.attribute_name().map(str::to_string)
                }
                _ => None,
            }
        });

        Ok(TableDescription {
            partition_key,
            ttl_attribute,
        })
    }

    async fn create_table(&self, table: &str, partition_key: &str) -> Result<(), BackendError> {
        let definition = AttributeDefinition::builder()
            .attribute_name(partition_key)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| build_error("CreateTable", e))?;
        let key = KeySchemaElement::builder()
            .attribute_name(partition_key)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| build_error("CreateTable", e))?;

        let result = self
            .client
            .create_table()
            .table_name(table)
            .attribute_definitions(definition)
            .key_schema(key)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let in_use = e
                    .as_service_error()
                    .map(|se| se.is_resource_in_use_exception())
                    .unwrap_or(false);
                if in_use {
                    Err(BackendError::TableExists(table.to_string()))
                } else {
                    Err(request_error("CreateTable", e))
                }
            }
        }
    }

    async fn enable_time_to_live(&self, table: &str, attribute: &str) -> Result<(), BackendError> {
        let ttl = TimeToLiveSpecification::builder()
            .enabled(true)
            .attribute_name(attribute)
            .build()
            .map_err(|e| build_error("UpdateTimeToLive", e))?;

        let result = self
            .client
            .update_time_to_live()
            .table_name(table)
            .time_to_live_specification(ttl)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let already = e
                    .as_service_error()
                    .and_then(|se| se.message())
                    .map(ttl_already_enabled)
                    .unwrap_or(false);
                if already {
                    debug!("TTL already enabled on {}", table);
                    Ok(())
                } else {
                    Err(request_error("UpdateTimeToLive", e))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_already_enabled() {
        assert!(ttl_already_enabled("TimeToLive is already enabled"));
        assert!(!ttl_already_enabled("Table is being created"));
    }

    #[test]
    fn test_parse_record() {
        let mut item = HashMap::new();
        item.insert(ID_ATTRIBUTE.to_string(), AttributeValue::S("ABC".into()));
        item.insert(EXPIRATION_ATTRIBUTE.to_string(), AttributeValue::N("1700000000".into()));
        item.insert(DATA_ATTRIBUTE.to_string(), AttributeValue::S("payload".into()));

        let record = parse_record("ABC", &item).unwrap();
        assert_eq!(record.id, "ABC");
        assert_eq!(record.expiration, 1_700_000_000);
        assert_eq!(record.data, "payload");
    }

    #[test]
    fn test_parse_record_missing_data() {
        let mut item = HashMap::new();
        item.insert(EXPIRATION_ATTRIBUTE.to_string(), AttributeValue::N("1".into()));
        assert!(matches!(
            parse_record("ABC", &item),
            Err(BackendError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_parse_record_bad_expiration() {
        let mut item = HashMap::new();
        item.insert(EXPIRATION_ATTRIBUTE.to_string(), AttributeValue::S("soon".into()));
        item.insert(DATA_ATTRIBUTE.to_string(), AttributeValue::S("payload".into()));
        assert!(parse_record("ABC", &item).is_err());
    }
}
