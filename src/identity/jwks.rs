//! Process-wide cache of the identity provider's signing keys.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use jsonwebtoken::DecodingKey;
use reqwest::header::{CACHE_CONTROL, HeaderMap};
// self
use crate::{
	_prelude::*,
	error::{TransientError, TransportError},
	http::ReqwestHttpClient,
};

/// Upper bound on how long a fetched key set is trusted, whatever the key endpoint advertises.
pub const MAX_KEY_TTL: Duration = Duration::days(7);

const KEY_ENDPOINT: &str = "identity key endpoint";
const RSA_KEY_TYPE: &str = "RSA";
const RS256: &str = "RS256";
const SIGNATURE_USE: &str = "sig";

/// JWKS cache shared by every verification.
///
/// Keys expire per the key endpoint's `Cache-Control: max-age` (or the configured default
/// TTL). Refetches are single-flight: concurrent callers that find the set expired wait for
/// one fetch and reuse its result. An unknown `kid` triggers a refetch at most once per
/// `min_refetch_interval`, which covers key rotation without letting forged `kid`s hammer the
/// endpoint.
pub struct JwksCache {
	url: Url,
	http_client: ReqwestHttpClient,
	default_ttl: Duration,
	min_refetch_interval: Duration,
	current: RwLock<Option<Arc<KeySet>>>,
	refetch: AsyncMutex<()>,
	fetches: AtomicU64,
}
impl JwksCache {
	/// Creates an empty cache; the first lookup fetches the key set.
	pub fn new(
		url: Url,
		http_client: ReqwestHttpClient,
		default_ttl: Duration,
		min_refetch_interval: Duration,
	) -> Self {
		Self {
			url,
			http_client,
			default_ttl,
			min_refetch_interval,
			current: RwLock::new(None),
			refetch: AsyncMutex::new(()),
			fetches: AtomicU64::new(0),
		}
	}

	/// Number of successful key-set fetches so far.
	pub fn fetch_count(&self) -> u64 {
		self.fetches.load(Ordering::Relaxed)
	}

	/// Resolves the decoding key for `kid`.
	pub async fn key(&self, kid: &str) -> Result<DecodingKey> {
		let now = OffsetDateTime::now_utc();
		let observed = self.snapshot();

		if let Some(set) = observed.as_ref().filter(|set| set.is_fresh_at(now)) {
			if let Some(key) = set.keys.get(kid) {
				return Ok(key.clone());
			}
			if now < set.fetched_at.saturating_add(self.min_refetch_interval) {
				return Err(unknown_kid(kid));
			}
		}

		let set = self.refetch(observed.map(|set| set.generation)).await?;

		set.keys.get(kid).cloned().ok_or_else(|| unknown_kid(kid))
	}

	fn snapshot(&self) -> Option<Arc<KeySet>> {
		self.current.read().clone()
	}

	async fn refetch(&self, observed: Option<u64>) -> Result<Arc<KeySet>> {
		let _single_flight = self.refetch.lock().await;

		// Another caller refreshed while this one waited.
		if let Some(set) = self.snapshot().filter(|set| Some(set.generation) != observed) {
			return Ok(set);
		}

		let set = Arc::new(self.fetch().await?);

		*self.current.write() = Some(set.clone());

		Ok(set)
	}

	async fn fetch(&self) -> Result<KeySet> {
		let response =
			self.http_client.get(self.url.clone()).send().await.map_err(map_reqwest_error)?;
		let status = response.status();

		if !status.is_success() {
			return Err(TransientError::KeyEndpoint {
				message: format!("key endpoint returned HTTP {status}"),
				status: Some(status.as_u16()),
			}
			.into());
		}

		let ttl = cache_max_age(response.headers()).unwrap_or(self.default_ttl).min(MAX_KEY_TTL);
		let body = response.bytes().await.map_err(map_reqwest_error)?;
		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let document: JwkSet = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| TransientError::KeySetParse { source })?;
		let keys = document
			.keys
			.into_iter()
			.filter_map(|jwk| jwk.into_decoding_key())
			.collect::<HashMap<_, _>>();

		if keys.is_empty() {
			return Err(TransientError::KeyEndpoint {
				message: "key set contains no usable RS256 signing keys".into(),
				status: Some(status.as_u16()),
			}
			.into());
		}

		let fetched_at = OffsetDateTime::now_utc();
		let generation = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;

		Ok(KeySet { keys, fetched_at, expires_at: fetched_at.saturating_add(ttl), generation })
	}
}
impl Debug for JwksCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwksCache")
			.field("url", &self.url.as_str())
			.field("cached_keys", &self.snapshot().map(|set| set.keys.len()))
			.field("fetches", &self.fetch_count())
			.finish()
	}
}

struct KeySet {
	keys: HashMap<String, DecodingKey>,
	fetched_at: OffsetDateTime,
	expires_at: OffsetDateTime,
	generation: u64,
}
impl KeySet {
	fn is_fresh_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at
	}
}

#[derive(Deserialize)]
struct JwkSet {
	keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
	kty: String,
	kid: Option<String>,
	alg: Option<String>,
	#[serde(rename = "use")]
	key_use: Option<String>,
	n: Option<String>,
	e: Option<String>,
}
impl Jwk {
	fn into_decoding_key(self) -> Option<(String, DecodingKey)> {
		if self.kty != RSA_KEY_TYPE
			|| self.alg.as_deref().is_some_and(|alg| alg != RS256)
			|| self.key_use.as_deref().is_some_and(|key_use| key_use != SIGNATURE_USE)
		{
			return None;
		}

		let key = DecodingKey::from_rsa_components(self.n.as_deref()?, self.e.as_deref()?).ok()?;

		Some((self.kid?, key))
	}
}

fn cache_max_age(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(CACHE_CONTROL)?.to_str().ok()?;

	value.split(',').find_map(|directive| {
		let (name, secs) = directive.trim().split_once('=')?;

		if !name.trim().eq_ignore_ascii_case("max-age") {
			return None;
		}

		let secs = secs.trim().trim_matches('"').parse::<i64>().ok().filter(|secs| *secs >= 0)?;

		Some(Duration::seconds(secs).min(MAX_KEY_TTL))
	})
}

fn map_reqwest_error(err: ReqwestError) -> Error {
	if err.is_timeout() {
		return TransientError::KeyEndpoint {
			message: "request timed out while fetching signing keys".into(),
			status: err.status().map(|code| code.as_u16()),
		}
		.into();
	}

	TransportError::network(KEY_ENDPOINT, err).into()
}

fn unknown_kid(kid: &str) -> Error {
	Error::unauthenticated(format!("identity token was signed with unknown key `{kid}`"))
}
