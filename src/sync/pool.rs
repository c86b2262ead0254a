use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use std_semaphore::Semaphore;

use crate::error::Result;
use crate::opts::Opts;

use super::{Conn, Env};

/// Client-side pool of idle connections.
pub struct Pool {
    env: Env,
    opts: Opts,
    conns: ArrayQueue<Conn>,
    semaphore: Option<Semaphore>,
}

impl Pool {
    pub fn new(env: Env, opts: Opts) -> Self {
        let semaphore = opts
            .pool_max_concurrency
            .map(|n| Semaphore::new(n as isize));
        Self {
            conns: ArrayQueue::new(opts.pool_max_idle_conn.max(1)),
            env,
            opts,
            semaphore,
        }
    }

    pub fn get(self: &Arc<Self>) -> Result<PooledConn> {
        if let Some(sem) = &self.semaphore {
            sem.acquire();
        }
        let conn = loop {
            match self.conns.pop() {
                Some(c) if !c.is_broken() => break Ok(c),
                // Connection dead, try next one
                Some(_) => {}
                None => break Conn::new(&self.env, self.opts.clone()),
            }
        };
        let conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                if let Some(sem) = &self.semaphore {
                    sem.release();
                }
                return Err(e);
            }
        };
        Ok(PooledConn {
            conn: ManuallyDrop::new(conn),
            pool: Arc::clone(self),
        })
    }

    /// Number of idle connections.
    pub fn idle(&self) -> usize {
        self.conns.len()
    }

    fn check_in(&self, mut conn: Conn) {
        if conn.is_broken() {
            return;
        }
        // uncommitted work never leaks into the next checkout
        if (conn.in_transaction() || !conn.autocommit()) && conn.rollback().is_err() {
            return;
        }
        if conn.autocommit() != self.opts.autocommit
            && conn.set_autocommit(self.opts.autocommit).is_err()
        {
            return;
        }
        let _ = self.conns.push(conn);
    }
}

pub struct PooledConn {
    pool: Arc<Pool>,
    conn: ManuallyDrop<Conn>,
}

impl Deref for PooledConn {
    type Target = Conn;
    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        // SAFETY: conn is never accessed after this
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        self.pool.check_in(conn);
        if let Some(sem) = &self.pool.semaphore {
            sem.release();
        }
    }
}
