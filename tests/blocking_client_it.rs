mod common;

// std
use std::sync::Arc;
// crates.io
use serde_json::Value;
// self
use bitbucket_rest::{
	BlockingClient,
	auth::{Authenticator, Credential},
	error::{ApiError, Error, RedirectError},
	http::ApiRequest,
	pagination,
};
use common::{ManualClock, Reply, ScriptedTransport};

fn client(
	transport: &ScriptedTransport,
	authenticator: Authenticator,
) -> BlockingClient<ScriptedTransport> {
	BlockingClient::new(transport.clone(), common::endpoints(), authenticator)
		.with_clock(Arc::new(ManualClock::new()))
}

#[test]
fn redirects_follow_one_hop() {
	let transport = ScriptedTransport::new([
		Reply::redirect(302, "https://x/y?a=1"),
		Reply::redirect(302, "https://x/z"),
	]);
	let client = client(&transport, Authenticator::None);
	let response = client.send(ApiRequest::get("a")).expect("Second redirect should pass through.");

	assert_eq!(response.status.as_u16(), 302);
	assert_eq!(transport.recorded()[1].url, "https://x/y?a=1");

	transport.push([Reply::redirect(307, "https://x/b"), Reply::json(200, r#"{"ok":true}"#)]);

	let body: Value = client.get("a").expect("Followed redirect should decode.");

	assert_eq!(body["ok"], true);
	assert_eq!(transport.calls(), 4);

	transport.push([Reply::redirect(302, "https://cdn/file")]);

	assert_eq!(
		client.redirect_location(ApiRequest::get("file")).expect("Redirect should resolve."),
		"https://cdn/file"
	);

	transport.push([Reply::json(200, "{}")]);

	assert!(matches!(
		client.redirect_location(ApiRequest::get("file")),
		Err(Error::Redirect(RedirectError::NotRedirect { status: 200 }))
	));
}

#[test]
fn iterator_is_lazy_and_ordered() {
	let transport = ScriptedTransport::new([
		Reply::json(200, r#"{"values":["a","b"],"next":"https://x/refs?page=2"}"#),
		Reply::json(200, r#"{"values":["c","d"],"next":"https://x/refs?page=3"}"#),
		Reply::json(200, r#"{"values":["e","f"]}"#),
	]);
	let client = client(&transport, Authenticator::None);
	let mut refs = client.pages::<String>(pagination::first_page("refs", None));

	assert_eq!(transport.calls(), 0);
	assert_eq!(refs.next().map(|item| item.expect("Item should load.")).as_deref(), Some("a"));
	assert_eq!(refs.pages_fetched(), 1);

	let rest = refs.collect::<Result<Vec<_>, _>>().expect("Remaining pages should load.");

	assert_eq!(rest, ["b", "c", "d", "e", "f"]);
	assert_eq!(transport.calls(), 3);
}

#[test]
fn eager_list_and_errors_match_the_async_client() {
	let transport = ScriptedTransport::new([
		Reply::json(200, r#"{"values":[1,2],"next":"https://x/items?page=2"}"#),
		Reply::json(200, r#"{"values":[3,4],"next":"https://x/items?page=3"}"#),
	]);
	let client = client(&transport, Authenticator::None);
	let items = client
		.list::<u32>(pagination::first_page("items", None), 3)
		.expect("Bounded list should succeed.");

	assert_eq!(items, [1, 2, 3, 4]);
	assert_eq!(transport.calls(), 2);

	transport.push([Reply::text(404, "not found"), Reply::text(404, "not found")]);

	let direct = client.get::<Value>("missing").expect_err("404 should fail the direct call.");
	let listed = client
		.list::<Value>(pagination::first_page("missing", None), 0)
		.expect_err("404 should fail the eager list.");

	for err in [direct, listed] {
		assert!(matches!(
			err,
			Error::Api(ApiError { status: 404, ref body }) if body == "not found"
		));
	}
}

#[test]
fn client_credentials_refresh_before_the_call() {
	let transport = ScriptedTransport::new([
		Reply::json(200, r#"{"access_token":"abc","expires_in":10}"#),
		Reply::json(200, "{}"),
	]);
	let client = client(&transport, Authenticator::client_credentials(Credential::new("ck", "cs")));
	let _: Value = client.get("user").expect("Call should succeed.");
	let recorded = transport.recorded();

	assert_eq!(recorded[0].url, "https://x/oauth2/token");
	assert_eq!(recorded[1].authorization(), "Bearer abc");
}

#[test]
fn handshake_runs_on_the_calling_thread() {
	let transport = ScriptedTransport::new([
		Reply::text(200, "oauth_token=rt1&oauth_token_secret=rts1"),
		Reply::text(200, "oauth_token=at1&oauth_token_secret=ats1"),
		Reply::json(200, "{}"),
	]);
	let client = client(&transport, Authenticator::three_legged(Credential::new("ck", "cs")));

	assert_eq!(client.request_token().expect("Request token should be issued.").token(), "rt1");
	assert!(
		client
			.authorization_url()
			.expect("Authorization URL should be issued.")
			.as_str()
			.ends_with("oauth_token=rt1")
	);
	assert_eq!(
		client.authenticate_with_pin("9999").expect("PIN should be accepted.").token(),
		"at1"
	);

	let _: Value = client.get("user").expect("Signed call should succeed.");

	assert!(transport.recorded()[2].authorization().contains("oauth_token=\"at1\""));
}
