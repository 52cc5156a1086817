pub mod controller;
pub mod reconcile;

#[cfg(test)]
mod test {
    use super::reconcile::derive_key;

    use http::{Request, Response};
    use kube::client::Body;
    use kube::Client;
    use serde_json::json;

    async fn key_against(response: serde_json::Value, status: u16) -> String {
        let (mock_service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().path(),
                "/apis/apis.kcp.io/v1alpha1/apibindings"
            );
            let body = serde_json::to_vec(&response).unwrap();
            send.send_response(
                Response::builder()
                    .status(status)
                    .body(Body::from(body))
                    .unwrap(),
            );
        });

        let client = Client::new(mock_service, "default");
        let key = derive_key(&client).await;
        server.await.unwrap();
        key
    }

    #[tokio::test]
    async fn test_key_from_binding_annotation() {
        let response = json!({
            "apiVersion": "apis.kcp.io/v1alpha1",
            "kind": "APIBindingList",
            "metadata": {},
            "items": [{
                "apiVersion": "apis.kcp.io/v1alpha1",
                "kind": "APIBinding",
                "metadata": {
                    "name": "gateway",
                    "annotations": {"kcp.io/path": "root:orgs:acme"},
                },
                "spec": {},
            }],
        });
        assert_eq!(key_against(response, 200).await, "root:orgs:acme");
    }

    #[tokio::test]
    async fn test_key_falls_back_to_default_without_bindings() {
        let response = json!({
            "apiVersion": "apis.kcp.io/v1alpha1",
            "kind": "APIBindingList",
            "metadata": {},
            "items": [],
        });
        assert_eq!(key_against(response, 200).await, "default");
    }

    #[tokio::test]
    async fn test_key_falls_back_to_default_when_crd_is_absent() {
        let response = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "reason": "NotFound",
            "code": 404,
        });
        assert_eq!(key_against(response, 404).await, "default");
    }
}
