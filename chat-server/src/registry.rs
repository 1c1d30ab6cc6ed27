//! 在线用户表
//!
//! 用户名到连接句柄的并发安全映射，保证用户名唯一。
//! 所有操作各自原子；锁只在修改或拷贝映射时持有，绝不跨越网络 IO。

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

/// 用户表错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// 用户名已被占用
    #[error("user {0:?} already exists")]
    DuplicateName(String),
}

/// 在线用户表
pub struct UserRegistry<C> {
    users: Mutex<HashMap<String, C>>,
}

impl<C: Clone> UserRegistry<C> {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// 注册用户，用户名已存在时失败
    pub fn add(&self, name: &str, conn: C) -> Result<(), RegistryError> {
        let mut users = self.users.lock();
        if users.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        users.insert(name.to_string(), conn);
        Ok(())
    }

    /// 移除用户，不存在时什么也不做
    pub fn remove(&self, name: &str) -> Option<C> {
        self.users.lock().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<C> {
        self.users.lock().get(name).cloned()
    }

    /// 某一时刻的完整拷贝，返回时已释放锁
    pub fn snapshot(&self) -> Vec<(String, C)> {
        let users = self.users.lock();
        users
            .iter()
            .map(|(name, conn)| (name.clone(), conn.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

impl<C: Clone> Default for UserRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
