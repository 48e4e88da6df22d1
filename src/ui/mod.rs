pub mod embeds;
pub mod i18n;
