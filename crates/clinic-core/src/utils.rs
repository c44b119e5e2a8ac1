//! 通用工具函数

use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;

/// 生成医生工号，格式: H + 两位年份 + 四位随机数字
pub fn generate_employee_id() -> String {
    let year = Utc::now().format("%y");
    let number: u16 = rand::thread_rng().gen_range(0..10000);
    format!("H{}{:04}", year, number)
}

/// 生成临时登录密码
pub fn generate_temp_password(length: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), length)
}

/// 生成数字验证码
pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0u8..10)))
        .collect()
}

/// 验证工号格式
pub fn is_valid_employee_id(employee_id: &str) -> bool {
    employee_id.len() == 7
        && employee_id.starts_with('H')
        && employee_id[1..].chars().all(|c| c.is_ascii_digit())
}
