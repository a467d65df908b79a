use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    constants::{CATALOG_CACHE_KEY, CATALOG_CACHE_TTL},
    error::{CacheError, Error},
};

// Caching - keys

#[derive(Clone, Debug)]
pub struct CacheKey {
    _value: String,
    _type: CacheKeyType,
}

impl CacheKey {
    pub fn from<T: ToString>(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key.to_string(),
            _type: r#type,
        }
    }
}

impl From<&CacheKey> for String {
    fn from(value: &CacheKey) -> Self {
        match value._type {
            CacheKeyType::Tags => format!("tags-{}", value._value),
            CacheKeyType::Tag => format!("tag-{}", value._value),
            CacheKeyType::IngredientSearch => format!("ingredients-{}", value._value),
            CacheKeyType::Ingredient => format!("ingredient-{}", value._value),
            CacheKeyType::RevokedSession => format!("revoked-session-{}", value._value),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from(self))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tags,
    Tag,
    IngredientSearch,
    Ingredient,
    RevokedSession,
}

impl CacheKeyType {
    pub fn new<T: ToString>(self, key: T) -> CacheKey {
        CacheKey::from(self, key)
    }
}

impl From<&CacheKey> for CacheLifetime {
    fn from(value: &CacheKey) -> Self {
        match value._type {
            CacheKeyType::Tags
            | CacheKeyType::Tag
            | CacheKeyType::IngredientSearch
            | CacheKeyType::Ingredient => CacheLifetime::BindCatalogCache,
            CacheKeyType::RevokedSession => CacheLifetime::Infinite,
        }
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    Infinite,
    BindCatalogCache,
}

impl CacheLifetime {
    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, Error> {
        match self {
            CacheLifetime::Infinite => Ok(None),
            CacheLifetime::BindCatalogCache => {
                get_cache_value::<&str, String>(CATALOG_CACHE_KEY, cache).await
            }
        }
    }

    pub async fn validate_cache_bind(
        &self,
        bind: &Option<String>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, Error> {
        Ok(bind == &self.get_cache_bind(cache).await?)
    }

    /// Seconds a stored value is kept. Rotating a bind only orphans values, so
    /// bound values have to expire on their own.
    pub fn expiry(&self) -> Option<u64> {
        match self {
            CacheLifetime::Infinite => None,
            CacheLifetime::BindCatalogCache => Some(CATALOG_CACHE_TTL),
        }
    }

    /// Invalidates every value bound to this lifetime.
    pub async fn rotate(&self, cache: &mut MultiplexedConnection) -> Result<(), Error> {
        match self {
            CacheLifetime::Infinite => Ok(()),
            CacheLifetime::BindCatalogCache => {
                let bind = Uuid::new_v4().to_string();
                log::info!("> Rotating {CATALOG_CACHE_KEY} to {bind}");
                set_cache_value(CATALOG_CACHE_KEY, bind, cache).await
            }
        }
    }
}

#[derive(Serialize, serde::Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: serde::Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: serde::Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    async fn new(
        value: T,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, Error> {
        let bind = lifetime.get_cache_bind(cache).await?;

        Ok(Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        })
    }

    async fn validate(&self, cache: &mut MultiplexedConnection) -> Result<bool, Error> {
        self._lifetime.validate_cache_bind(&self._bind, cache).await
    }

    async fn lookup(
        key: &CacheKey,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<RedisValue<T>>, Error> {
        let value = get_cache_value::<String, RedisValue<T>>(key.into(), cache)
            .await
            .unwrap_or_else(|_| {
                let mut c = cache.clone();
                let k = key.to_string();
                tokio::spawn(async move {
                    log::error!("> Failed to deserialize cached value. Deleting {}", &k);
                    if let Err(e) = delete_cache_value(k, &mut c).await {
                        log::error!("> Failed to delete cached value! {e}");
                    }
                });
                None
            });

        // * Cannot use .map(|| {...}) due to async closures
        match value {
            Some(value) => {
                log::trace!("> Found {}", key);
                if value.validate(cache).await? {
                    Ok(Some(value))
                } else {
                    log::trace!("> Invalidated {}", key);
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    async fn store(
        key: &CacheKey,
        value: T,
        cache: &mut MultiplexedConnection,
    ) -> Result<RedisValue<T>, Error> {
        let lifetime: CacheLifetime = key.into();
        let value = RedisValue::new(value, lifetime, cache).await?;

        let stored = match lifetime.expiry() {
            Some(seconds) => {
                set_cache_value_ex::<String, RedisValue<T>>(key.into(), value.clone(), seconds, cache)
                    .await
            }
            None => set_cache_value::<String, RedisValue<T>>(key.into(), value.clone(), cache).await,
        };
        if let Err(e) = stored {
            log::error!("> Failed to cache {}: {e}", key);
        }

        Ok(value)
    }

    pub async fn get_or_optional<F, Fut>(
        key: CacheKey,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<Option<RedisValue<T>>, Error>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>, Error>> + Send,
    {
        if let Some(value) = Self::lookup(&key, cache).await? {
            return Ok(Some(value));
        }

        log::trace!("> Fetching {}", key);
        match callback().await? {
            Some(value) => Ok(Some(Self::store(&key, value, cache).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_or<F, Fut>(
        key: CacheKey,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<RedisValue<T>, Error>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send,
    {
        if let Some(value) = Self::lookup(&key, cache).await? {
            return Ok(value);
        }

        log::trace!("> Fetching {}", key);
        let value = callback().await?;
        Self::store(&key, value, cache).await
    }
}

// Sessions

pub async fn revoke_session(
    token_id: &str,
    lifetime: u64,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let key = CacheKeyType::RevokedSession.new(token_id);
    // Expired tokens fail verification on their own; keep the marker at least a second.
    set_cache_value_ex(String::from(&key), true, lifetime.max(1), cache).await
}

pub async fn is_session_revoked(
    token_id: &str,
    cache: &mut MultiplexedConnection,
) -> Result<bool, Error> {
    let key = CacheKeyType::RevokedSession.new(token_id);
    cache_value_exists(String::from(&key), cache).await
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache.set(key, value).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn set_cache_value_ex<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    seconds: u64,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache
        .set_ex(key, value, seconds)
        .await
        .map_err(CacheError::from)?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache.del(key).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, Error> {
    let value: Option<V> = cache.get(key).await.map_err(CacheError::from)?;

    Ok(value)
}

pub async fn cache_value_exists<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<bool, Error> {
    let exists: bool = cache.exists(key).await.map_err(CacheError::from)?;

    Ok(exists)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CacheKeyType::Tags, "all", "tags-all")]
    #[case(CacheKeyType::Tag, "3", "tag-3")]
    #[case(CacheKeyType::IngredientSearch, "мол", "ingredients-мол")]
    #[case(CacheKeyType::Ingredient, "12", "ingredient-12")]
    #[case(CacheKeyType::RevokedSession, "abc", "revoked-session-abc")]
    fn keys_are_namespaced(#[case] r#type: CacheKeyType, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(r#type.new(key).to_string(), expected);
    }

    #[rstest]
    #[case(CacheKeyType::Tags, CacheLifetime::BindCatalogCache)]
    #[case(CacheKeyType::Ingredient, CacheLifetime::BindCatalogCache)]
    #[case(CacheKeyType::RevokedSession, CacheLifetime::Infinite)]
    fn catalog_values_are_bound_to_the_catalog(
        #[case] r#type: CacheKeyType,
        #[case] lifetime: CacheLifetime,
    ) {
        let key = r#type.new("x");

        assert_eq!(CacheLifetime::from(&key), lifetime);
    }

    #[rstest]
    #[case(CacheKeyType::Tags)]
    #[case(CacheKeyType::Tag)]
    #[case(CacheKeyType::IngredientSearch)]
    #[case(CacheKeyType::Ingredient)]
    fn catalog_values_expire(#[case] r#type: CacheKeyType) {
        let lifetime = CacheLifetime::from(&r#type.new("мол"));

        assert_eq!(lifetime.expiry(), Some(CATALOG_CACHE_TTL));
    }

    #[test]
    fn unbound_values_are_kept() {
        assert_eq!(CacheLifetime::Infinite.expiry(), None);
    }
}
