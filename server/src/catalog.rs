//! Read-only catalog of historical events used as round challenges

use async_trait::async_trait;
use log::info;
use shared::{Challenge, ChallengeId, Coordinate};
use tokio::sync::RwLock;

use crate::error::StoreError;

#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Every challenge in a stable order
    async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError>;

    async fn get_challenge(&self, id: ChallengeId) -> Result<Option<Challenge>, StoreError>;

    /// Loads the built-in sample events if the catalog is empty.
    /// Returns how many entries were inserted.
    async fn ensure_seeded(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    challenges: RwLock<Vec<Challenge>>,
}

impl InMemoryCatalog {
    /// An empty catalog; `ensure_seeded` fills it with the sample events
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_challenges(challenges: Vec<Challenge>) -> Self {
        Self {
            challenges: RwLock::new(challenges),
        }
    }
}

#[async_trait]
impl ContentCatalog for InMemoryCatalog {
    async fn list_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        Ok(self.challenges.read().await.clone())
    }

    async fn get_challenge(&self, id: ChallengeId) -> Result<Option<Challenge>, StoreError> {
        let challenges = self.challenges.read().await;
        Ok(challenges.iter().find(|c| c.id == id).cloned())
    }

    async fn ensure_seeded(&self) -> Result<usize, StoreError> {
        let mut challenges = self.challenges.write().await;
        if !challenges.is_empty() {
            return Ok(0);
        }

        *challenges = sample_challenges();
        info!("Seeded catalog with {} sample events", challenges.len());
        Ok(challenges.len())
    }
}

fn challenge(
    title: &str,
    description: &str,
    image_url: &str,
    lat: f64,
    lon: f64,
    year: i32,
) -> Challenge {
    Challenge {
        id: ChallengeId::new(),
        title: title.to_string(),
        description: description.to_string(),
        image_url: image_url.to_string(),
        coordinate: Coordinate::new(lat, lon),
        year,
    }
}

/// Built-in events, each pinned to where it happened
pub fn sample_challenges() -> Vec<Challenge> {
    vec![
        challenge(
            "First Moon Landing",
            "Neil Armstrong becomes the first human to walk on the Moon",
            "https://upload.wikimedia.org/wikipedia/commons/9/98/Aldrin_Apollo_11_original.jpg",
            28.5729,
            -80.6490, // Kennedy Space Center
            1969,
        ),
        challenge(
            "Fall of the Berlin Wall",
            "The Berlin Wall falls, marking the end of the Cold War era",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/c/c7/Thefalloftheberlinwall1989.JPG/1280px-Thefalloftheberlinwall1989.JPG",
            52.5200,
            13.4050,
            1989,
        ),
        challenge(
            "Titanic Sinking",
            "RMS Titanic sinks in the North Atlantic Ocean",
            "https://upload.wikimedia.org/wikipedia/commons/f/fd/RMS_Titanic_3.jpg",
            41.7325,
            -49.9469, // wreck site
            1912,
        ),
        challenge(
            "Hiroshima Atomic Bombing",
            "First atomic bomb used in warfare",
            "https://upload.wikimedia.org/wikipedia/commons/5/54/Atomic_cloud_over_Hiroshima.jpg",
            34.3853,
            132.4553,
            1945,
        ),
        challenge(
            "Chernobyl Disaster",
            "Nuclear reactor explosion at Chernobyl Power Plant",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/a/a3/Chernobyl_Power_Plant.jpg/1280px-Chernobyl_Power_Plant.jpg",
            51.3890,
            30.0990,
            1986,
        ),
        challenge(
            "Great Fire of London",
            "Major conflagration that swept through central London",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/2/25/Great_Fire_London.jpg/1280px-Great_Fire_London.jpg",
            51.5074,
            -0.1278,
            1666,
        ),
        challenge(
            "Machu Picchu Discovery",
            "Hiram Bingham brings Machu Picchu to international attention",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/e/eb/Machu_Picchu%2C_Peru.jpg/1280px-Machu_Picchu%2C_Peru.jpg",
            -13.1631,
            -72.5450,
            1911,
        ),
        challenge(
            "Signing of Magna Carta",
            "King John of England signs the Magna Carta",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/c/c8/Magna_Carta_%28British_Library_Cotton_MS_Augustus_II.106%29.jpg/800px-Magna_Carta_%28British_Library_Cotton_MS_Augustus_II.106%29.jpg",
            51.4415,
            -0.5539, // Runnymede
            1215,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_challenges_are_valid() {
        let challenges = sample_challenges();
        assert_eq!(challenges.len(), 8);
        for c in &challenges {
            assert!(c.coordinate.is_valid(), "{} has a bad coordinate", c.title);
            assert!(c.image_url.starts_with("https://"));
        }
    }

    #[tokio::test]
    async fn test_ensure_seeded_only_fills_empty_catalog() {
        let catalog = InMemoryCatalog::new();
        assert_eq!(catalog.ensure_seeded().await.unwrap(), 8);
        assert_eq!(catalog.ensure_seeded().await.unwrap(), 0);
        assert_eq!(catalog.list_challenges().await.unwrap().len(), 8);

        let custom = InMemoryCatalog::with_challenges(vec![challenge("x", "y", "z", 0.0, 0.0, 2000)]);
        assert_eq!(custom.ensure_seeded().await.unwrap(), 0);
        assert_eq!(custom.list_challenges().await.unwrap().len(), 1);
    }

    #[test]
    fn test_get_challenge() {
        let challenges = sample_challenges();
        let wanted = challenges[3].clone();
        let catalog = InMemoryCatalog::with_challenges(challenges);

        tokio_test::block_on(async {
            assert_eq!(catalog.get_challenge(wanted.id).await.unwrap(), Some(wanted));
            assert_eq!(catalog.get_challenge(ChallengeId::new()).await.unwrap(), None);
        });
    }
}
