pub mod auth;
pub mod controller;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod test_support {
    use http::{Request, Response};
    use kube::client::Body;
    use kube::Client;

    /// Client whose transport is never exercised by the test
    pub fn unreachable_client() -> Client {
        let (mock_service, _handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        Client::new(mock_service, "default")
    }
}
