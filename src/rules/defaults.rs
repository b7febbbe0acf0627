//! Built-in rule tables used by [`RuleSetBuilder::new`](super::RuleSetBuilder::new).

/// Block patterns, matched case-insensitively against element markup, text,
/// resource URLs and outbound request targets.
pub const BLOCK_PATTERNS: &[&str] = &[
    r"googlesyndication",
    r"doubleclick",
    r"adsystem",
    r"adservice",
    r"googletagmanager",
    r"google-analytics",
    r"taboola",
    r"outbrain",
    r"facebook\.net",
    r"criteo",
    r"adnxs",
    r"popads",
    r"propellerads",
    r"\b(?:ads?|adslot|ad-slot|adunit|ad-unit|adbox|advert\w*|sponsored|banner-ad|beacon|impression|tracking|tracker)\b",
];

/// Patterns over executable code (inline scripts, event handlers,
/// `javascript:` URLs and scheduled callbacks).
pub const MALICIOUS_PATTERNS: &[&str] = &[
    r"window\.open\s*\(",
    r"(?:window|document|top|self|parent)\.location(?:\.href)?\s*=[^=]",
    r"\blocation\.href\s*=[^=]",
    r"location\.(?:replace|assign)\s*\(",
    r"document\.write\s*\(\s*['\x22]<script",
    r"eval\s*\(\s*atob\s*\(",
    r"\bpop(?:up|under)\b",
];

/// Ad vocabulary searched in an element's text excerpt.
pub const KEYWORDS: &[&str] = &[
    "anuncio",
    "anúncio",
    "publicidade",
    "patrocinado",
    "promo",
    "oferta",
    "adchoices",
    "advertisement",
    "sponsored",
];

/// Consent and privacy vocabulary. Elements whose text contains one of these
/// are never hidden.
pub const CONSENT_VOCABULARY: &[&str] = &[
    "cookie",
    "consent",
    "privacy",
    "aceitar",
    "gdpr",
    "lgpd",
    "privacidade",
    "consentimento",
];

/// Class tokens that exempt an element from scoring.
pub const WHITELIST: &[&str] = &[
    "main",
    "content",
    "article",
    "body",
    "texto",
    "chapter-content",
    "manga-image",
    "reader",
    "comic",
    "cookie-consent",
    "cookie-notice",
    "accept-cookies",
    "consent-banner",
    "gdpr",
    "privacy-policy",
    "cookie-popup",
    "accept-all",
];

/// Class tokens that mark an anchor as internal navigation.
pub const NAVIGATION: &[&str] = &[
    "next",
    "prev",
    "chapter",
    "capitulo",
    "proximo",
    "anterior",
    "pagination",
    "page-link",
    "breadcrumb",
    "menu",
    "nav",
];

/// Hostname patterns of trusted destinations.
pub const TRUSTED_DOMAINS: &[&str] = &[
    r"(?:^|\.)webtoons\.com$",
    r"(?:^|\.)mangakakalot\.com$",
    r"(?:^|\.)readmanganato\.com$",
    r"(?:^|\.)mangadex\.org$",
    r"(?:^|\.)cdn\.",
    r"(?:^|\.)cloudflare\.com$",
    r"(?:^|\.)akamai\.net$",
    r"(?:^|\.)cookiebot\.com$",
    r"(?:^|\.)onetrust\.com$",
    r"(?:^|\.)consensu\.org$",
];

/// URL path patterns of trusted destinations (reader and article pages).
pub const TRUSTED_PATHS: &[&str] = &[
    r"^/(?:chapters?|capitulos?|manga|read|reader|comic|webtoon|title|series)(?:/|-|$)",
];

/// Candidate tag weights. Tags not listed weigh nothing.
pub const TAG_WEIGHTS: &[(&str, f64)] = &[
    ("iframe", 2.0),
    ("aside", 2.0),
    ("section", 2.0),
    ("script", 0.5),
    ("div", 0.0),
];

/// Score at or above which an element is hidden.
pub const THRESHOLD: f64 = 5.0;
