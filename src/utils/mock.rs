// src/utils/mock.rs

//! Offline transport that serves canned archive responses.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::Result;
use crate::utils::http::{HttpResponse, Transport};

const LISTING_PATH: &str = "/cdx/search/cdx";

const LISTING: &str = "\
org,archive)/about/\"%20id= 20000731030657 http://www.archive.org/about/%22%20id= text/html 302 OXCFCQFVBEUULMT2CUOBYU4T42VH7MYM 338
org,archive)/about/\"%20id= 20000731030659 http://archive.org/about/%22%20id= text/html 404 6GBF3VJD2SDHBHKQNNV7OAWW6YW33AKO 2943
org,archive)/about/%09identifier_marc.xml: 20000731030709 http://www.archive.org/about/%09IDENTIFIER_marc.xml: text/html 302 OXCFCQFVBEUULMT2CUOBYU4T42VH7MYM 350
org,archive)/about/%09identifier_marc.xml: 20000731030710 http://archive.org/about/%09IDENTIFIER_marc.xml: text/html 404 D6CHVFU5PP4OYNILSUWTASOOQLF6XSZC 2954
org,archive)/about/%09identifier_meta.xml 20000731030705 http://www.archive.org/about/%09IDENTIFIER_meta.xml text/html 302 OXCFCQFVBEUULMT2CUOBYU4T42VH7MYM 349
org,archive)/about/%09identifier_meta.xml 20000731030706 http://archive.org/about/%09IDENTIFIER_meta.xml text/html 404 YZNHYLIJFOUQZZYIYLJRAKMT42OXT2NS 2955
org,archive)/about/%0d%0aexclude.php 20000726224227 http://www.archive.org/about/%0d%0aexclude.php text/html 404 RECXT54QH34IINX54NU4VRFSGJD4MFMZ 2942
org,archive)/about/%0d%0aexclude.php 20000906001931 http://www.archive.org/about/%0d%0aexclude.php text/html 404 CYSYSFG5DXSXMLLR25X5MNP2Z5FXLD22 2313
org,archive)/about/%0d%0aexclude.php 20000913011111 http://www.archive.org/about/%0d%0aexclude.php text/html 404 CYSYSFG5DXSXMLLR25X5MNP2Z5FXLD22 2313
org,archive)/about/%0d%0aexclude.php 20000919234953 http://www.archive.org/about/%0d%0aexclude.php text/html 404 CYSYSFG5DXSXMLLR25X5MNP2Z5FXLD22 2316
";

const PAGE: &str = "<!DOCTYPE HTML>
<html>
    <body>
    </body>
</html>
";

/// Number of records the mock listing serves on its first page.
pub const MOCK_RECORD_COUNT: usize = 10;

/// Transport that never touches the network.
///
/// Listing requests get ten archive.org records on page 0 and an empty page
/// afterwards. Every other request gets a small HTML page after a random
/// 100-500ms delay.
#[derive(Debug, Clone, Default)]
pub struct MockTransport;

impl MockTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let parsed = url::Url::parse(url)?;

        if parsed.path().to_lowercase().starts_with(LISTING_PATH) {
            tokio::time::sleep(Duration::from_millis(15)).await;
            let first_page = parsed
                .query_pairs()
                .find(|(key, _)| key == "page")
                .is_none_or(|(_, value)| value == "0");
            let body = if first_page { LISTING } else { "" };
            return Ok(HttpResponse::from_bytes(200, body));
        }

        let delay = rand::rng().random_range(100..500);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(HttpResponse::from_bytes(200, PAGE))
    }
}
