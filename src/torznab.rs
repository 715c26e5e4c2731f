use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, macros::format_description};

pub const TORZNAB_NS: &str = "http://torznab.com/schemas/2015/feed";
pub const ANIME_CATEGORY_ID: u32 = 5070;

#[derive(Debug, Clone)]
pub struct ChannelMetadata {
    pub title: String,
    pub description: String,
    pub site_link: String,
}

#[derive(Debug, Clone)]
pub struct TorznabItem {
    pub title: String,
    pub guid: String,
    pub link: String,
    pub enclosure_url: String,
    pub published: OffsetDateTime,
    pub size_bytes: u64,
    pub description: Option<String>,
    pub poster: Option<String>,
    pub info_hash: Option<String>,
    pub seeders: Option<u32>,
    pub leechers: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TorznabCategory {
    pub id: u32,
    pub name: &'static str,
    pub upstream_hint: &'static str,
}

/// Fixed category table; `upstream_hint` is the label forwarded to the
/// catalog when a client filters by the corresponding torznab id.
pub const CATEGORIES: &[TorznabCategory] = &[
    TorznabCategory {
        id: ANIME_CATEGORY_ID,
        name: "Anime",
        upstream_hint: "anime",
    },
    TorznabCategory {
        id: 5000,
        name: "TV",
        upstream_hint: "tv",
    },
    TorznabCategory {
        id: 5030,
        name: "AnimeOther",
        upstream_hint: "anime_other",
    },
];

#[derive(Debug, Error)]
pub enum TorznabBuildError {
    #[error("failed to build XML document")]
    Xml(#[from] quick_xml::Error),
    #[error("failed to format XML document as UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("failed to format timestamp")]
    Timestamp(#[from] time::error::Format),
}

/// Renders a publish date in the fixed RFC-2822-style pattern with a
/// literal `+0000`; the value is converted to UTC first, whatever its
/// source offset.
pub fn format_pub_date(value: OffsetDateTime) -> Result<String, time::error::Format> {
    let pattern = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] +0000"
    );
    value.to_offset(UtcOffset::UTC).format(pattern)
}

/// Static capabilities document. Pure: two calls are byte-identical.
pub fn render_caps(
    metadata: &ChannelMetadata,
    default_limit: usize,
    max_limit: usize,
) -> Result<String, TorznabBuildError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("caps")))?;

    let mut server = BytesStart::new("server");
    server.push_attribute(("title", metadata.title.as_str()));
    server.push_attribute(("description", metadata.description.as_str()));
    server.push_attribute(("version", env!("CARGO_PKG_VERSION")));
    writer.write_event(Event::Empty(server))?;

    let mut limits = BytesStart::new("limits");
    limits.push_attribute(("default", default_limit.to_string().as_str()));
    limits.push_attribute(("max", max_limit.to_string().as_str()));
    writer.write_event(Event::Empty(limits))?;

    writer.write_event(Event::Start(BytesStart::new("searching")))?;
    write_search_mode(&mut writer, "search", true, "q")?;
    write_search_mode(&mut writer, "tv-search", true, "q,season,ep")?;
    write_search_mode(&mut writer, "movie-search", true, "q")?;
    write_search_mode(&mut writer, "music-search", false, "")?;
    write_search_mode(&mut writer, "book-search", false, "")?;
    writer.write_event(Event::End(BytesEnd::new("searching")))?;

    writer.write_event(Event::Start(BytesStart::new("categories")))?;
    for category in CATEGORIES {
        let id = category.id.to_string();
        let mut category_el = BytesStart::new("category");
        category_el.push_attribute(("id", id.as_str()));
        category_el.push_attribute(("name", category.name));
        writer.write_event(Event::Empty(category_el))?;
    }
    writer.write_event(Event::End(BytesEnd::new("categories")))?;

    writer.write_event(Event::End(BytesEnd::new("caps")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Renders the RSS 2.0 feed document; items appear in the order supplied.
pub fn render_feed(
    metadata: &ChannelMetadata,
    items: &[TorznabItem],
) -> Result<String, TorznabBuildError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:torznab", TORZNAB_NS));
    writer.write_event(Event::Start(rss))?;

    writer.write_event(Event::Start(BytesStart::new("channel")))?;
    write_text_element(&mut writer, "title", &metadata.title)?;
    write_text_element(&mut writer, "description", &metadata.description)?;
    write_text_element(&mut writer, "link", &metadata.site_link)?;
    let build_date = format_pub_date(OffsetDateTime::now_utc())?;
    write_text_element(&mut writer, "lastBuildDate", &build_date)?;

    for item in items {
        write_item(&mut writer, item)?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_item(
    writer: &mut Writer<Vec<u8>>,
    item: &TorznabItem,
) -> Result<(), TorznabBuildError> {
    writer.write_event(Event::Start(BytesStart::new("item")))?;
    write_text_element(writer, "title", &item.title)?;

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "false"));
    writer.write_event(Event::Start(guid))?;
    writer.write_event(Event::Text(BytesText::new(&item.guid)))?;
    writer.write_event(Event::End(BytesEnd::new("guid")))?;

    write_text_element(writer, "link", &item.link)?;

    let published = format_pub_date(item.published)?;
    write_text_element(writer, "pubDate", &published)?;

    write_text_element(writer, "category", &ANIME_CATEGORY_ID.to_string())?;

    if let Some(description) = item.description.as_deref() {
        write_text_element(writer, "description", description)?;
    }

    write_text_element(writer, "size", &item.size_bytes.to_string())?;

    let mut enclosure = BytesStart::new("enclosure");
    enclosure.push_attribute(("url", item.enclosure_url.as_str()));
    enclosure.push_attribute(("length", item.size_bytes.to_string().as_str()));
    enclosure.push_attribute(("type", "application/x-bittorrent"));
    writer.write_event(Event::Empty(enclosure))?;

    write_attr(writer, "category", &ANIME_CATEGORY_ID.to_string())?;

    if let Some(seeders) = item.seeders {
        write_attr(writer, "seeders", &seeders.to_string())?;
    }
    if item.seeders.is_some() || item.leechers.is_some() {
        // peers = seeders + leechers, the convention most clients expect
        let peers = item.seeders.unwrap_or(0) + item.leechers.unwrap_or(0);
        write_attr(writer, "peers", &peers.to_string())?;
    }
    if let Some(leechers) = item.leechers {
        write_attr(writer, "leechers", &leechers.to_string())?;
    }
    if let Some(info_hash) = item.info_hash.as_deref() {
        write_attr(writer, "infohash", info_hash)?;
    }
    if let Some(poster) = item.poster.as_deref() {
        write_attr(writer, "coverurl", poster)?;
    }

    writer.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn write_search_mode(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    available: bool,
    supported_params: &str,
) -> Result<(), quick_xml::Error> {
    let mut mode = BytesStart::new(name);
    mode.push_attribute(("available", if available { "yes" } else { "no" }));
    if !supported_params.is_empty() {
        mode.push_attribute(("supportedParams", supported_params));
    }
    writer.write_event(Event::Empty(mode))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_attr(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &str,
) -> Result<(), quick_xml::Error> {
    let mut attr = BytesStart::new("torznab:attr");
    attr.push_attribute(("name", name));
    attr.push_attribute(("value", value));
    writer.write_event(Event::Empty(attr))?;
    Ok(())
}
