//! JSON-over-HTTP client for chain nodes.

mod stream;
mod types;

pub use stream::{event_lines, MAX_EVENT_LINE};
pub use types::*;

use async_trait::async_trait;
use chainload_core::{ChainClient, ClientError, DeployInfo, DeployRequest, EventStream};
use chainload_types::factory::create_block;
use chainload_types::{Block, BlockStatus, KeyPair, Motes, Node};
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Client for node RPC endpoints.
///
/// Holds one connection pool; the node to talk to is given per call.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
}

impl RpcClient {
    /// Create a new RPC client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    /// Streaming responses must outlive the request timeout.
    fn stream_client() -> Result<Client, ClientError> {
        Client::builder()
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))
    }
}

fn http_error(err: reqwest::Error) -> ClientError {
    if err.is_connect() || err.is_timeout() {
        ClientError::Unavailable(err.to_string())
    } else {
        ClientError::Http(err.to_string())
    }
}

/// Map non-success statuses onto client errors.
async fn check_status(response: Response, what: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(what.to_string()));
    }
    if status.is_server_error() {
        return Err(ClientError::Unavailable(format!("{what}: {status}")));
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn submit_deploy(
        &self,
        node: &Node,
        key_pair: &KeyPair,
        request: &DeployRequest,
    ) -> Result<String, ClientError> {
        let body = SubmitDeployRequest {
            deploy: request.clone(),
            hash: request.hash(),
            signature: request.sign(key_pair)?,
        };

        let response = self
            .client
            .post(format!("{}/deploys", node.rpc_url()))
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response, "deploy submission").await?;
        let reply: SubmitDeployResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        if !reply.accepted {
            return Err(ClientError::Rejected {
                status: 200,
                message: reply.error.unwrap_or_else(|| "rejected".to_string()),
            });
        }
        let hash = reply.deploy_hash.unwrap_or(body.hash);
        debug!(node = %node.label(), deploy_hash = %hash, "Deploy submitted");
        Ok(hash)
    }

    async fn get_balance(&self, node: &Node, account_id: &str) -> Result<Motes, ClientError> {
        let response = self
            .client
            .get(format!("{}/accounts/{}/balance", node.rpc_url(), account_id))
            .send()
            .await
            .map_err(http_error)?;
        match check_status(response, account_id).await {
            Ok(response) => {
                let body: BalanceResponse = response
                    .json()
                    .await
                    .map_err(|e| ClientError::Decode(e.to_string()))?;
                Ok(body.balance)
            }
            // Absent account reads as an empty purse.
            Err(ClientError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn get_block(&self, node: &Node, block_hash: &str) -> Result<Block, ClientError> {
        let response = self
            .client
            .get(format!("{}/blocks/{}", node.rpc_url(), block_hash))
            .send()
            .await
            .map_err(http_error)?;
        let body: BlockResponse = check_status(response, block_hash)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let status = if body.finalized {
            BlockStatus::Finalized
        } else {
            BlockStatus::Added
        };
        Ok(create_block(
            &node.network,
            body.block_hash,
            body.height,
            body.timestamp,
            body.deploy_count,
            body.proposer,
            status,
        ))
    }

    async fn get_deploys(
        &self,
        node: &Node,
        block_hash: &str,
    ) -> Result<Vec<DeployInfo>, ClientError> {
        let response = self
            .client
            .get(format!("{}/blocks/{}/deploys", node.rpc_url(), block_hash))
            .send()
            .await
            .map_err(http_error)?;
        let body: BlockDeploysResponse = check_status(response, block_hash)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(body.deploys)
    }

    async fn stream_events(&self, node: &Node) -> Result<EventStream, ClientError> {
        let response = Self::stream_client()?
            .get(format!("{}/events", node.event_url()))
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response, "event stream").await?;
        debug!(node = %node.label(), "Event stream connected");

        let chunks = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(event_lines(chunks, MAX_EVENT_LINE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainload_core::DeployPayload;
    use chainload_types::factory::create_node;
    use chainload_types::{NodeStatus, NodeType};
    use chrono::Utc;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn node_for(server: &MockServer) -> Node {
        let addr = server.address();
        create_node(
            "loc1",
            1,
            addr.ip().to_string(),
            addr.port(),
            addr.port(),
            NodeStatus::Healthy,
            NodeType::Full,
            100,
        )
        .unwrap()
    }

    fn client() -> RpcClient {
        RpcClient::new(Duration::from_secs(5)).unwrap()
    }

    fn transfer_request(key_pair: &KeyPair) -> DeployRequest {
        DeployRequest {
            sender: "sender".into(),
            sender_public_key: key_pair.public_key.clone(),
            payload: DeployPayload::Transfer {
                target: "target".into(),
                amount: 5,
                contract_hash: None,
            },
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_account_reads_as_zero_balance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/absent/balance"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/accounts/rich/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(BalanceResponse { balance: 42 }))
            .mount(&server)
            .await;

        let node = node_for(&server);
        assert_eq!(client().get_balance(&node, "absent").await.unwrap(), 0);
        assert_eq!(client().get_balance(&node, "rich").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_status_codes_map_to_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocks/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocks/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocks/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad hash"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/blocks/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{"))
            .mount(&server)
            .await;

        let node = node_for(&server);
        let client = client();

        let gone = client.get_block(&node, "gone").await.unwrap_err();
        assert!(matches!(gone, ClientError::NotFound(_)));
        assert!(!gone.is_retryable());

        let busy = client.get_block(&node, "busy").await.unwrap_err();
        assert!(matches!(busy, ClientError::Unavailable(_)));
        assert!(busy.is_retryable());

        let bad = client.get_block(&node, "bad").await.unwrap_err();
        assert_eq!(
            bad,
            ClientError::Rejected {
                status: 400,
                message: "bad hash".into()
            }
        );
        assert!(!bad.is_retryable());

        let garbled = client.get_block(&node, "garbled").await.unwrap_err();
        assert!(matches!(garbled, ClientError::Decode(_)));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_retryable() {
        let server = MockServer::builder().start().await;
        let node = node_for(&server);
        drop(server);

        let err = client().get_balance(&node, "any").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_submit_deploy_accepted_and_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deploys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(SubmitDeployResponse {
                accepted: true,
                deploy_hash: Some("chain-hash".into()),
                error: None,
            }))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/deploys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(SubmitDeployResponse {
                accepted: false,
                deploy_hash: None,
                error: Some("insufficient funds".into()),
            }))
            .mount(&server)
            .await;

        let node = node_for(&server);
        let key_pair = KeyPair::generate(&mut ChaCha8Rng::seed_from_u64(9));
        let request = transfer_request(&key_pair);
        let client = client();

        let hash = client.submit_deploy(&node, &key_pair, &request).await.unwrap();
        assert_eq!(hash, "chain-hash");

        let refused = client
            .submit_deploy(&node, &key_pair, &request)
            .await
            .unwrap_err();
        assert_eq!(
            refused,
            ClientError::Rejected {
                status: 200,
                message: "insufficient funds".into()
            }
        );
    }

    #[tokio::test]
    async fn test_event_stream_decodes_body_lines() {
        let body = concat!(
            r#"{"event_id":1,"timestamp":"2024-01-01T00:00:00Z","type":"deploy_finalized","data":{"block_hash":"b1","deploy_hash":"d1"}}"#,
            "\n\n",
            r#"{"event_id":2,"timestamp":"2024-01-01T00:00:00Z","type":"step","data":{}}"#,
        );
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let events: Vec<_> = client()
            .stream_events(&node_for(&server))
            .await
            .unwrap()
            .collect()
            .await;
        let ids: Vec<u64> = events.iter().map(|e| e.as_ref().unwrap().event_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
