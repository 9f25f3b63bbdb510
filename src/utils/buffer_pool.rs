//! # Buffer Pool
//!
//! Object pool for the scratch buffers backing inbound and outbound packets,
//! to avoid per-frame allocation under connection churn.
//!
//! ## Usage
//! ```rust
//! use tank_gate::utils::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(100); // 100 buffers in pool
//! let mut buffer = pool.acquire();
//! buffer.extend_from_slice(b"payload");
//! // Buffer automatically returned to pool on drop
//! ```
//!
//! Return-on-drop makes failure to release a buffer structurally impossible:
//! every exit path, including dispatch failures, runs the destructor.

use std::sync::{Arc, Mutex};

/// Maximum buffer capacity eligible for pooling; larger ones are deallocated.
const MAX_POOLED_BUFFER_SIZE: usize = 16 * 1024;

/// Default buffer capacity, sized to the receive buffer of a connection.
const DEFAULT_BUFFER_CAPACITY: usize = 4096;

/// A pooled buffer that returns itself to the pool when dropped
pub struct PooledBuffer {
    buffer: Vec<u8>,
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    max_pooled: usize,
}

impl PooledBuffer {
    /// Get the underlying buffer, consuming this wrapper
    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if self.buffer.capacity() <= self.max_pooled {
            self.buffer.clear(); // Clear data but keep capacity
            if let Ok(mut pool) = self.pool.lock() {
                if pool.len() < pool.capacity() {
                    pool.push(std::mem::take(&mut self.buffer));
                }
            }
        }
        // Otherwise, let it be deallocated
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

/// Thread-safe bounded buffer pool.
///
/// Buffers beyond the bound are dropped rather than retained, so a burst of
/// traffic cannot pin memory forever.
pub struct BufferPool {
    pool: Arc<Mutex<Vec<Vec<u8>>>>,
    initial_capacity: usize,
}

impl BufferPool {
    /// Create a new buffer pool retaining at most `pool_size` idle buffers.
    pub fn new(pool_size: usize) -> Self {
        let mut pool = Vec::with_capacity(pool_size);

        for _ in 0..pool_size {
            pool.push(Vec::with_capacity(DEFAULT_BUFFER_CAPACITY));
        }

        Self {
            pool: Arc::new(Mutex::new(pool)),
            initial_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Acquire a buffer from the pool, or allocate a fresh one if the pool is
    /// empty. Exhaustion degrades to allocation, never to failure.
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = if let Ok(mut pool) = self.pool.lock() {
            pool.pop()
                .unwrap_or_else(|| Vec::with_capacity(self.initial_capacity))
        } else {
            Vec::with_capacity(self.initial_capacity)
        };

        PooledBuffer {
            buffer,
            pool: self.pool.clone(),
            max_pooled: MAX_POOLED_BUFFER_SIZE,
        }
    }

    /// Current number of idle buffers.
    pub fn available(&self) -> usize {
        self.pool.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Clone for BufferPool {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            initial_capacity: self.initial_capacity,
        }
    }
}
