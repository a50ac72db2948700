//! Entity normalization: maps ticker and spelling variants to canonical names.
//!
//! Applied at extraction time (inside the LLM gateway, before responses are
//! cached) and defensively re-applied before entity mentions are written.
//! Pure and idempotent: `normalize_entity_name(normalize_entity_name(x)) ==
//! normalize_entity_name(x)`.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Canonical crypto asset → accepted variants (tickers matched with or
/// without `$`). Covers the top assets by news volume.
pub const CRYPTO_ENTITY_VARIANTS: &[(&str, &[&str])] = &[
    ("Bitcoin", &["btc", "xbt", "bitcoin"]),
    ("Ethereum", &["eth", "ether", "ethereum"]),
    ("Solana", &["sol", "solana"]),
    ("Ripple", &["xrp", "ripple"]),
    ("BNB", &["bnb", "binance coin"]),
    ("Cardano", &["ada", "cardano"]),
    ("Dogecoin", &["doge", "dogecoin"]),
    ("Polygon", &["matic", "polygon"]),
    ("Polkadot", &["dot", "polkadot"]),
    ("Avalanche", &["avax", "avalanche"]),
    ("Chainlink", &["link", "chainlink"]),
    ("Uniswap", &["uni", "uniswap"]),
    ("Litecoin", &["ltc", "litecoin"]),
    ("Cosmos", &["atom", "cosmos"]),
    ("Tron", &["trx", "tron"]),
    ("Stellar", &["xlm", "stellar"]),
    ("Monero", &["xmr", "monero"]),
    ("Algorand", &["algo", "algorand"]),
    ("VeChain", &["vet", "vechain"]),
    ("Filecoin", &["fil", "filecoin"]),
    ("Shiba Inu", &["shib", "shiba inu"]),
    ("Arbitrum", &["arb", "arbitrum"]),
    ("Optimism", &["op", "optimism"]),
    ("Aptos", &["apt", "aptos"]),
    ("Sui", &["sui"]),
    ("Pepe", &["pepe"]),
    ("Injective", &["inj", "injective"]),
    ("Stacks", &["stx", "stacks"]),
    ("Render", &["rndr", "render"]),
    ("Immutable", &["imx", "immutable"]),
    ("Kaspa", &["kas", "kaspa"]),
    ("Celestia", &["tia", "celestia"]),
    ("Sei", &["sei"]),
    ("Lido DAO", &["ldo", "lido", "lido dao"]),
    ("Maker", &["mkr", "maker", "makerdao"]),
    ("Compound", &["comp", "compound"]),
    ("Aave", &["aave"]),
    ("EOS", &["eos"]),
    ("Tezos", &["xtz", "tezos"]),
    ("Internet Computer", &["icp", "internet computer"]),
    ("The Graph", &["grt", "the graph"]),
    ("Hedera", &["hbar", "hedera"]),
    ("MultiversX", &["egld", "elrond", "multiversx"]),
    ("Theta", &["theta"]),
    ("ApeCoin", &["ape", "apecoin"]),
    ("Decentraland", &["mana", "decentraland"]),
    ("The Sandbox", &["sand", "the sandbox"]),
    ("Axie Infinity", &["axs", "axie infinity"]),
    ("Fantom", &["ftm", "fantom"]),
    ("Near Protocol", &["near", "near protocol"]),
    ("Toncoin", &["ton", "toncoin"]),
    ("Chiliz", &["chz", "chiliz"]),
    ("Tether", &["usdt", "tether"]),
    ("USD Coin", &["usdc", "usd coin"]),
];

/// Canonical organization → accepted variants. These dominate crypto news
/// flow and show up under many spellings.
pub const ORG_ENTITY_VARIANTS: &[(&str, &[&str])] = &[
    ("SEC", &["sec", "securities and exchange commission", "u.s. sec"]),
    ("CFTC", &["cftc", "commodity futures trading commission"]),
    ("Binance", &["binance"]),
    ("Coinbase", &["coinbase"]),
    ("Kraken", &["kraken"]),
    ("BlackRock", &["blackrock", "black rock"]),
    ("Fidelity", &["fidelity"]),
    ("Grayscale", &["grayscale"]),
    ("MicroStrategy", &["microstrategy", "mstr"]),
    ("Circle", &["circle"]),
    ("Federal Reserve", &["fed", "federal reserve"]),
];

fn variant_index() -> &'static HashMap<&'static str, &'static str> {
    static INDEX: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        let mut map = HashMap::new();
        for (canonical, variants) in CRYPTO_ENTITY_VARIANTS.iter().chain(ORG_ENTITY_VARIANTS) {
            for variant in *variants {
                map.insert(*variant, *canonical);
            }
        }
        map
    })
}

/// Return the canonical name for any known variant; unknown names pass
/// through unchanged. Lookup is case-insensitive and tolerates a leading `$`.
pub fn normalize_entity_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }

    let lowered = trimmed.to_lowercase();
    let key = lowered.strip_prefix('$').unwrap_or(&lowered);

    match variant_index().get(key) {
        Some(canonical) => canonical.to_string(),
        None => trimmed.to_string(),
    }
}

/// True if the name is already a canonical entity name.
pub fn is_canonical(name: &str) -> bool {
    CRYPTO_ENTITY_VARIANTS
        .iter()
        .chain(ORG_ENTITY_VARIANTS)
        .any(|(canonical, _)| *canonical == name)
}

/// All (canonical, variants) pairs.
pub fn canonical_entities() -> impl Iterator<Item = (&'static str, &'static [&'static str])> {
    CRYPTO_ENTITY_VARIANTS
        .iter()
        .chain(ORG_ENTITY_VARIANTS)
        .map(|(c, v)| (*c, *v))
}

/// Crypto asset (canonical, variants) pairs, e.g. for building the
/// rule-based extraction regexes.
pub fn crypto_entities() -> impl Iterator<Item = (&'static str, &'static [&'static str])> {
    CRYPTO_ENTITY_VARIANTS.iter().map(|(c, v)| (*c, *v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_variants_map_to_canonical() {
        assert_eq!(normalize_entity_name("BTC"), "Bitcoin");
        assert_eq!(normalize_entity_name("$btc"), "Bitcoin");
        assert_eq!(normalize_entity_name("ethereum"), "Ethereum");
        assert_eq!(normalize_entity_name("XRP"), "Ripple");
    }

    #[test]
    fn organizations_normalize() {
        assert_eq!(normalize_entity_name("sec"), "SEC");
        assert_eq!(
            normalize_entity_name("Securities and Exchange Commission"),
            "SEC"
        );
        assert_eq!(normalize_entity_name("blackrock"), "BlackRock");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(normalize_entity_name("Unknown Token"), "Unknown Token");
        assert_eq!(normalize_entity_name(""), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        for (canonical, variants) in canonical_entities() {
            for variant in variants {
                let once = normalize_entity_name(variant);
                assert_eq!(once, canonical);
                assert_eq!(normalize_entity_name(&once), once);
            }
        }
    }

    #[test]
    fn canonical_names_are_fixed_points() {
        assert!(is_canonical("Bitcoin"));
        assert!(!is_canonical("btc"));
        assert_eq!(normalize_entity_name("Bitcoin"), "Bitcoin");
    }

    #[test]
    fn map_covers_at_least_fifty_assets() {
        assert!(CRYPTO_ENTITY_VARIANTS.len() >= 50);
    }
}
