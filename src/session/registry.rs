//! Role-id keyed player lookup. Players persist across reconnects; the entry
//! outlives any one transport.

use crate::session::player::Player;
use crate::utils::buffer_pool::BufferPool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct PlayerRegistry {
    pool: BufferPool,
    players: RwLock<HashMap<i32, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new(pool: BufferPool) -> Self {
        Self {
            pool,
            players: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, role_id: i32) -> Arc<Player> {
        if let Some(player) = self
            .players
            .read()
            .expect("player registry poisoned")
            .get(&role_id)
        {
            return Arc::clone(player);
        }
        let mut players = self.players.write().expect("player registry poisoned");
        Arc::clone(
            players
                .entry(role_id)
                .or_insert_with(|| Player::new(role_id, self.pool.clone())),
        )
    }

    pub fn get(&self, role_id: i32) -> Option<Arc<Player>> {
        self.players
            .read()
            .expect("player registry poisoned")
            .get(&role_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.players.read().expect("player registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
