// =============================================================================
// EndpointClassifier — pure (path, method) -> RateLimitCategory mapping
// =============================================================================
//
// Ported from `rate_limit_manager.py`'s `EndpointClassifier`: a literal-path
// table is tried first; unmatched paths fall through to prefix rules. Results
// are memoized per (method, path) since the mapping is pure.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use super::RateLimitCategory;

fn literal_mappings() -> HashMap<(&'static str, &'static str), RateLimitCategory> {
    use RateLimitCategory::*;
    HashMap::from([
        (("GET", "/spot/tickers"), Public),
        (("GET", "/spot/order_book"), Public),
        (("GET", "/spot/candlesticks"), Public),
        (("GET", "/spot/currency_pairs"), Public),
        (("GET", "/spot/accounts"), SpotOther),
        (("GET", "/spot/my_trades"), SpotOther),
        (("GET", "/wallet/fee"), WalletOther),
    ])
}

pub struct EndpointClassifier {
    literal: HashMap<(&'static str, &'static str), RateLimitCategory>,
    cache: RwLock<HashMap<(String, String), RateLimitCategory>>,
}

impl Default for EndpointClassifier {
    fn default() -> Self {
        Self {
            literal: literal_mappings(),
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl EndpointClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, path: &str, method: &str) -> RateLimitCategory {
        let key = (path.to_string(), method.to_string());
        if let Some(cat) = self.cache.read().get(&key) {
            return *cat;
        }

        let category = self.classify_uncached(path, method);
        self.cache.write().insert(key, category);
        category
    }

    fn classify_uncached(&self, path: &str, method: &str) -> RateLimitCategory {
        if let Some(cat) = self.literal.get(&(method, path)) {
            return *cat;
        }

        let method = method.to_ascii_uppercase();

        if path.starts_with("/spot/orders") {
            return match method.as_str() {
                "POST" | "PUT" => RateLimitCategory::SpotOrderPlace,
                "DELETE" => RateLimitCategory::SpotOrderCancel,
                _ => RateLimitCategory::SpotOther,
            };
        }
        if path.starts_with("/spot/") {
            return RateLimitCategory::SpotOther;
        }

        if path.starts_with("/futures/") && path.contains("/orders") {
            return match method.as_str() {
                "POST" | "PUT" => RateLimitCategory::FuturesOrder,
                "DELETE" => RateLimitCategory::FuturesCancel,
                _ => RateLimitCategory::FuturesOther,
            };
        }
        if path.starts_with("/futures/") {
            return RateLimitCategory::FuturesOther;
        }

        if path.starts_with("/wallet/withdrawals") {
            return RateLimitCategory::WalletWithdraw;
        }
        if path.starts_with("/wallet/") {
            return RateLimitCategory::WalletOther;
        }

        RateLimitCategory::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RateLimitCategory::*;

    #[test]
    fn classifies_literal_public_endpoints() {
        let c = EndpointClassifier::new();
        assert_eq!(c.classify("/spot/tickers", "GET"), Public);
        assert_eq!(c.classify("/spot/candlesticks", "GET"), Public);
    }

    #[test]
    fn classifies_spot_order_mutations_by_method() {
        let c = EndpointClassifier::new();
        assert_eq!(c.classify("/spot/orders", "POST"), SpotOrderPlace);
        assert_eq!(c.classify("/spot/orders/12345", "DELETE"), SpotOrderCancel);
        assert_eq!(c.classify("/spot/orders/12345", "GET"), SpotOther);
    }

    #[test]
    fn classifies_wallet_withdraw_specially() {
        let c = EndpointClassifier::new();
        assert_eq!(c.classify("/wallet/withdrawals", "POST"), WalletWithdraw);
        assert_eq!(c.classify("/wallet/deposits", "GET"), WalletOther);
    }

    #[test]
    fn classification_is_pure_and_cached() {
        let c = EndpointClassifier::new();
        let a = c.classify("/spot/orders", "POST");
        let b = c.classify("/spot/orders", "POST");
        assert_eq!(a, b);
    }

    #[test]
    fn unmatched_paths_default_to_public() {
        let c = EndpointClassifier::new();
        assert_eq!(c.classify("/anything/else", "GET"), Public);
    }
}
