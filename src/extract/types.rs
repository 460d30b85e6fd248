//! Typed records produced by the extraction heuristics.

use serde::Serialize;

/// Where on the page an ad was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Top,
    Bottom,
    Shopping,
    LocalPack,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAd {
    pub position: usize,
    pub placement: Placement,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingAd {
    pub position: usize,
    pub placement: Placement,
    pub title: String,
    pub price: String,
    pub merchant: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAd {
    pub position: usize,
    pub placement: Placement,
    pub title: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub sponsored: bool,
}

/// Any ad record, tagged by kind at the serialization boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdRecord {
    Search(SearchAd),
    Shopping(ShoppingAd),
    Local(LocalAd),
}

impl AdRecord {
    pub fn position(&self) -> usize {
        match self {
            AdRecord::Search(ad) => ad.position,
            AdRecord::Shopping(ad) => ad.position,
            AdRecord::Local(ad) => ad.position,
        }
    }

    pub fn placement(&self) -> Placement {
        match self {
            AdRecord::Search(ad) => ad.placement,
            AdRecord::Shopping(ad) => ad.placement,
            AdRecord::Local(ad) => ad.placement,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            AdRecord::Search(ad) => &ad.title,
            AdRecord::Shopping(ad) => &ad.title,
            AdRecord::Local(ad) => &ad.title,
        }
    }
}

/// Everything pulled out of one results page.
///
/// `local_ads` only holds sponsored local listings; unsponsored ones are
/// kept in `local_results` and never count as ads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedPage {
    pub search_ads: Vec<SearchAd>,
    pub shopping_ads: Vec<ShoppingAd>,
    pub local_ads: Vec<LocalAd>,
    pub local_results: Vec<LocalAd>,
    pub related_searches: Vec<String>,
    pub organic_count: usize,
}

impl ExtractedPage {
    pub fn total_ads(&self) -> usize {
        self.search_ads.len() + self.shopping_ads.len() + self.local_ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_ads() == 0
            && self.local_results.is_empty()
            && self.related_searches.is_empty()
            && self.organic_count == 0
    }

    /// All ads as tagged records: search, then shopping, then local.
    pub fn ad_records(&self) -> Vec<AdRecord> {
        self.search_ads
            .iter()
            .cloned()
            .map(AdRecord::Search)
            .chain(self.shopping_ads.iter().cloned().map(AdRecord::Shopping))
            .chain(self.local_ads.iter().cloned().map(AdRecord::Local))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_records_serialize_with_type_tag() {
        let record = AdRecord::Shopping(ShoppingAd {
            position: 1,
            placement: Placement::Shopping,
            title: "Router".into(),
            price: "$99.00".into(),
            merchant: Some("NetStore".into()),
            image: None,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "shopping");
        assert_eq!(json["placement"], "shopping");
        assert_eq!(json["price"], "$99.00");
        assert_eq!(record.title(), "Router");
    }
}
