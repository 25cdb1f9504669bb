//! Authenticated client behavior against an instrumented provider and transport.
//!
//! Run: cargo nextest run --test client_tests

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use authfetch::{Error, RequestOptions};
use common::{MintingProvider, ScriptedTransport, client};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Coalescing
// =============================================================================

mod coalescing_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_call() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(200, r#"{"lists":[1,2,3]}"#);
        let client = client(&provider, &transport);

        let responses = join_all((0..10).map(|_| client.get("/lists"))).await;

        assert_eq!(transport.calls(), 1);
        for response in responses {
            let body: serde_json::Value = response.unwrap().json().unwrap();
            assert_eq!(body["lists"][2], 3);
        }

        let stats = client.stats();
        assert_eq!(stats.requests, 10);
        assert_eq!(stats.cache_hits, 9);
        assert_eq!(stats.pool_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_token_refresh() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        let paths: Vec<String> = (0..8).map(|i| format!("/decks/{i}")).collect();
        let responses = join_all(paths.iter().map(|p| client.get(p))).await;

        assert!(responses.iter().all(|r| r.is_ok()));
        assert_eq!(transport.calls(), 8);
        assert_eq!(provider.refreshes(), 1);
        for i in 0..8 {
            assert_eq!(transport.bearer(i), "token-1");
        }
        assert_eq!(client.stats().token_refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_never_deduplicated() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        let body = serde_json::json!({"answer": "B"});
        let (a, b) = tokio::join!(
            client.post_json("/answers", &body),
            client.post_json("/answers", &body)
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(transport.calls(), 2);
        assert_eq!(client.stats().cache_hits, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_follower_does_not_cancel_shared_read() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        let token = CancellationToken::new();
        let cancel_later = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        };

        let (leader, follower, ()) = tokio::join!(
            client.get("/lists"),
            client.request("/lists", RequestOptions::get().cancel(token.clone())),
            cancel_later
        );

        assert!(leader.is_ok());
        assert!(matches!(follower, Err(Error::Cancelled)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_identical_read_makes_a_new_call() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/lists").await.unwrap();
        client.get("/lists").await.unwrap();

        assert_eq!(transport.calls(), 2);
    }
}

// =============================================================================
// Token and identity caching
// =============================================================================

mod caching_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_recent_token_is_reused() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        client.get("/profile").await.unwrap();

        assert_eq!(provider.refreshes(), 1);
        assert_eq!(transport.bearer(1), "token-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_token_refreshes_once_before_sending() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        client.get("/profile").await.unwrap();

        assert_eq!(provider.refreshes(), 2);
        assert_eq!(transport.bearer(1), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_is_revalidated_under_continuous_traffic() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::with_delay(Duration::from_millis(1));
        let client = client(&provider, &transport);

        for _ in 0..36 {
            client.get("/profile").await.unwrap();
            tokio::time::advance(Duration::from_secs(10)).await;
        }

        assert_eq!(provider.user_reads(), 2);
        assert!(provider.session_reads.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_forces_full_resolution() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        assert_eq!(client.stats().token_cache_size, 1);

        client.clear_cache().await;
        let stats = client.stats();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.token_cache_size, 0);

        client.get("/profile").await.unwrap();
        assert_eq!(provider.refreshes(), 2);
        assert_eq!(provider.user_reads(), 2);
        assert_eq!(transport.bearer(1), "token-2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_signs_out_and_clears() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        client.logout().await;

        assert_eq!(provider.sign_outs.load(Ordering::SeqCst), 1);
        let err = client.get("/profile").await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
        assert_eq!(transport.calls(), 1);
    }
}

// =============================================================================
// Responses, retry and fallback
// =============================================================================

mod retry_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_missing_identity_makes_no_calls() {
        let provider = MintingProvider::signed_out();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        let err = client.get("/profile").await.unwrap_err();

        assert!(matches!(err, Error::NotAuthenticated));
        assert_eq!(transport.calls(), 0);
        assert_eq!(provider.refreshes(), 0);
        assert_eq!(client.stats().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_content_is_success() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(204, "");
        let client = client(&provider, &transport);

        let response = client.delete("/decks/7").await.unwrap();

        assert_eq!(response.status.as_u16(), 204);
        assert!(response.is_empty());
        assert_eq!(client.stats().errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_retries_once_with_fresh_token() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(401, "jwt expired");
        transport.respond(200, r#"{"ok":true}"#);
        let client = client(&provider, &transport);

        let response = client.get("/profile").await.unwrap();

        assert_eq!(response.text(), r#"{"ok":true}"#);
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.bearer(0), "token-1");
        assert_eq!(transport.bearer(1), "token-2");
        assert_eq!(client.stats().token_refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_unauthorized_is_terminal() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(401, "jwt expired");
        transport.respond(401, "user banned");
        transport.respond(200, "{}");
        let client = client(&provider, &transport);

        let err = client.get("/profile").await.unwrap_err();

        assert!(matches!(err, Error::Unauthorized { ref body } if body == "user banned"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_forced_refresh_retries_with_cached_token() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(401, "jwt expired");
        let client = client(&provider, &transport);

        let lose_session = {
            let provider = provider.clone();
            async move {
                // Let the first attempt obtain its token first.
                tokio::time::sleep(Duration::from_millis(50)).await;
                provider.forget_session();
                provider.set_throttled(true);
            }
        };
        let (result, ()) = tokio::join!(client.get("/profile"), lose_session);

        assert!(result.is_ok());
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.bearer(1), "token-1");
        assert_eq!(client.stats().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_forced_refresh_without_cached_token_propagates() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(200, "{}");
        transport.respond(401, "jwt expired");
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        provider.forget_session();
        provider.set_throttled(true);

        // First attempt reuses token-1; the throttled refresh evicted it, so
        // the forced refresh after 401 has nothing to fall back to.
        let err = client.get("/profile").await.unwrap_err();

        assert!(err.is_quota_exceeded());
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.bearer(1), "token-1");
        assert_eq!(provider.refreshes(), 3);
        assert_eq!(client.stats().errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_refresh_uses_session_token() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        provider.set_throttled(true);

        let response = client.get("/profile").await;

        assert!(response.is_ok());
        assert_eq!(transport.bearer(1), "token-1");
        assert_eq!(provider.refreshes(), 2);
        assert_eq!(client.stats().errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_throttled_refresh_uses_session_token() {
        let provider = MintingProvider::signed_in();
        provider.set_throttled(true);
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        let response = client.get("/profile").await;

        assert!(response.is_ok());
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.bearer(0), "token-0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_provider_falls_back_to_cached_token() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        client.get("/profile").await.unwrap();
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        provider.forget_session();
        provider.set_throttled(true);

        let response = client.get("/profile").await;

        assert!(response.is_ok());
        assert_eq!(transport.bearer(1), "token-1");
        assert_eq!(provider.refreshes(), 2);
        assert_eq!(client.stats().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_provider_without_any_token_fails() {
        let provider = MintingProvider::signed_in();
        provider.forget_session();
        provider.set_throttled(true);
        let transport = ScriptedTransport::new();
        let client = client(&provider, &transport);

        let err = client.get("/profile").await.unwrap_err();

        assert!(err.is_quota_exceeded());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_statuses_surface_without_retry() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::new();
        transport.respond(500, "database unavailable");
        let client = client(&provider, &transport);

        let err = client.get("/reports").await.unwrap_err();

        assert!(
            matches!(err, Error::Http { status: 500, ref body } if body == "database unavailable")
        );
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.stats().errors, 1);
        assert_eq!(client.stats().error_rate, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::with_delay(Duration::from_secs(60));
        let client = client(&provider, &transport);

        let options = RequestOptions::post().timeout(Duration::from_secs(2));
        let err = client.request("/imports", options).await.unwrap_err();

        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies_to_reads() {
        let provider = MintingProvider::signed_in();
        let transport = ScriptedTransport::with_delay(Duration::from_secs(45));
        let client = client(&provider, &transport);

        let err = client.get("/slow").await.unwrap_err();

        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(30)));
    }
}
