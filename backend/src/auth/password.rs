//! bcrypt hashing, run on the blocking pool

use super::service::AuthError;

pub async fn hash_password(password: String, cost: u32) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("Secret123".to_string(), 4).await.unwrap();
        assert_ne!(hash, "Secret123");
        assert!(verify_password("Secret123".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("Secret124".to_string(), hash).await.unwrap());
    }
}
