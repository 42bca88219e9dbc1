use super::EntityMeta;

#[derive(Debug, Clone)]
pub struct TelegramApp {
    pub meta: EntityMeta,
    pub api_id: i32,
    pub api_hash: String,
    pub name: String,
    pub max_accounts: u32,
    pub current_account_count: u32,
    pub is_active: bool,
}

impl TelegramApp {
    pub fn new(api_id: i32, api_hash: String, name: String) -> Self {
        Self {
            meta: EntityMeta::new(),
            api_id,
            api_hash,
            name,
            max_accounts: 25,
            current_account_count: 0,
            is_active: true,
        }
    }

    pub fn is_available(&self) -> bool {
        self.is_active && self.current_account_count < self.max_accounts
    }

    pub fn increment_account_count(&mut self) {
        self.current_account_count += 1;
        self.meta.touch();
    }

    pub fn decrement_account_count(&mut self) {
        if self.current_account_count > 0 {
            self.current_account_count -= 1;
        }
        self.meta.touch();
    }
}
