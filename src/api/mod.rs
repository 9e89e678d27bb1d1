use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::model::api::message::ErrorMessage;

mod public;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(public::routes());
    routes.extend(voting::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![json_catcher]
}

/// Framework-level failures (failed guards, unmatched routes, unparseable
/// bodies) get the same JSON body as application errors.
#[catch(default)]
fn json_catcher(status: Status, req: &Request<'_>) -> (Status, Json<ErrorMessage>) {
    debug!("Caught {status} for {} {}", req.method(), req.uri());
    let reason = status.reason().unwrap_or("Unknown error");
    (status, Json(ErrorMessage::new(reason)))
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use crate::model::store::MemoryStore;

    #[rocket::async_test]
    async fn unknown_route_is_json() {
        let client = crate::memory_client(&MemoryStore::new()).await;
        let response = client.get("/no/such/route").dispatch().await;
        assert_eq!(response.status().code, 404);

        let body = response.into_string().await.unwrap();
        let body: super::ErrorMessage = serde_json::from_str(&body).unwrap();
        assert_eq!(body.error, "Not Found");
    }
}
