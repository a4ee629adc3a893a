use unicode_normalization::UnicodeNormalization;

/// 统一比较形态：NFC + 小写
///
/// 同一个字符的组合/预组合两种写法在比较前归一。
pub fn normalize(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

/// 字段匹配抽象：token 与字段值（均已 normalize）
pub trait FieldMatcher: Send + Sync {
    fn matches(&self, field: &str, token: &str) -> bool;
}

/// 精确匹配（相等）
pub struct ExactMatcher;

impl FieldMatcher for ExactMatcher {
    fn matches(&self, field: &str, token: &str) -> bool {
        field == token
    }
}

/// 部分匹配（子串包含）
pub struct ContainsMatcher;

impl FieldMatcher for ContainsMatcher {
    fn matches(&self, field: &str, token: &str) -> bool {
        field.contains(token)
    }
}
