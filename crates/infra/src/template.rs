//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンでキャンペーンの件名・HTML・テキストを生成する。
//!
//! ## 2 段階の処理
//!
//! | 段階 | 単位 | 失敗時 |
//! |------|------|--------|
//! | [`TemplateRenderer::compile`] | キャンペーンごとに 1 回 | キャンペーン全体を失敗させる |
//! | [`CompiledTemplate::render`] | 購読者ごと | その購読者だけ失敗として記録し、続行する |
//!
//! HTML パートは自動エスケープする。件名・テキストはエスケープしない。
//! コンテキストにない変数を参照するとレンダリングエラーになる。

use std::error::Error as _;

use mailcast_domain::template::{RenderedParts, Template, TemplateData};
use tera::{Context, Tera};
use thiserror::Error;

const SUBJECT: &str = "subject.txt";
const HTML: &str = "body.html";
const TEXT: &str = "body.txt";

/// テンプレート処理のエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// 構文エラー（キャンペーン単位で致命的）
    #[error("テンプレートの解析に失敗: {0}")]
    Parse(String),

    /// レンダリングエラー（購読者単位）
    #[error("テンプレートのレンダリングに失敗: {0}")]
    Render(String),
}

/// テンプレートをコンパイルするトレイト
pub trait TemplateRenderer: Send + Sync {
    fn compile(&self, template: &Template) -> Result<Box<dyn CompiledTemplate>, TemplateError>;
}

/// コンパイル済みテンプレート
pub trait CompiledTemplate: Send + Sync {
    /// マージ済みの変数で 3 パートをレンダリングする
    fn render(&self, data: &TemplateData) -> Result<RenderedParts, TemplateError>;
}

/// tera によるテンプレートレンダラー
#[derive(Debug, Clone, Default)]
pub struct TeraTemplateRenderer;

impl TeraTemplateRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for TeraTemplateRenderer {
    fn compile(&self, template: &Template) -> Result<Box<dyn CompiledTemplate>, TemplateError> {
        // 拡張子で自動エスケープの対象が決まる（.html のみ）
        let mut engine = Tera::default();
        engine
            .add_raw_templates(vec![
                (SUBJECT, template.subject_part.as_str()),
                (HTML, template.html_part.as_str()),
                (TEXT, template.text_part.as_str()),
            ])
            .map_err(|e| TemplateError::Parse(describe(&e)))?;

        Ok(Box::new(TeraCompiledTemplate { engine }))
    }
}

struct TeraCompiledTemplate {
    engine: Tera,
}

impl TeraCompiledTemplate {
    fn render_part(&self, name: &str, context: &Context) -> Result<String, TemplateError> {
        self.engine
            .render(name, context)
            .map_err(|e| TemplateError::Render(describe(&e)))
    }
}

impl CompiledTemplate for TeraCompiledTemplate {
    fn render(&self, data: &TemplateData) -> Result<RenderedParts, TemplateError> {
        let mut context = Context::new();
        for (key, value) in data {
            context.insert(key.as_str(), value);
        }

        Ok(RenderedParts {
            subject: self.render_part(SUBJECT, &context)?,
            html:    self.render_part(HTML, &context)?,
            text:    self.render_part(TEXT, &context)?,
        })
    }
}

/// tera のエラーは原因が source 側に入るため、連鎖をまとめて 1 行にする
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use maplit::hashmap;
    use mailcast_domain::{template::TemplateId, user::UserId};
    use pretty_assertions::assert_eq;

    use super::*;

    fn make_template(subject: &str, html: &str, text: &str) -> Template {
        Template {
            id:           TemplateId::new(),
            user_id:      UserId::new(),
            name:         "welcome".to_string(),
            subject_part: subject.to_string(),
            html_part:    html.to_string(),
            text_part:    text.to_string(),
        }
    }

    #[test]
    fn 件名とhtmlとテキストをレンダリングできる() {
        let template = make_template(
            "{{ first_name }} さんへのお知らせ",
            "<p>こんにちは {{ first_name }} さん</p>",
            "こんにちは {{ first_name }} さん",
        );
        let compiled = TeraTemplateRenderer::new().compile(&template).unwrap();

        let parts = compiled
            .render(&hashmap! { "first_name".to_string() => "花子".to_string() })
            .unwrap();

        assert_eq!(
            parts,
            RenderedParts {
                subject: "花子 さんへのお知らせ".to_string(),
                html:    "<p>こんにちは 花子 さん</p>".to_string(),
                text:    "こんにちは 花子 さん".to_string(),
            }
        );
    }

    #[test]
    fn htmlパートだけがエスケープされる() {
        let template = make_template("{{ name }}", "<p>{{ name }}</p>", "{{ name }}");
        let compiled = TeraTemplateRenderer::new().compile(&template).unwrap();

        let parts = compiled
            .render(&hashmap! { "name".to_string() => "<b>A&B</b>".to_string() })
            .unwrap();

        assert_eq!(parts.subject, "<b>A&B</b>");
        assert_eq!(parts.text, "<b>A&B</b>");
        assert_eq!(parts.html, "<p>&lt;b&gt;A&amp;B&lt;&#x2F;b&gt;</p>");
    }

    #[test]
    fn 構文エラーはparseエラー() {
        let template = make_template("{{ unclosed", "<p></p>", "");

        let result = TeraTemplateRenderer::new().compile(&template);

        assert!(matches!(result, Err(TemplateError::Parse(_))));
    }

    #[test]
    fn 未定義の変数はrenderエラー() {
        let template = make_template("{{ missing }}", "", "");
        let compiled = TeraTemplateRenderer::new().compile(&template).unwrap();

        let result = compiled.render(&TemplateData::new());

        assert!(matches!(result, Err(TemplateError::Render(msg)) if msg.contains("missing")));
    }

    #[test]
    fn フィルタに渡せない値はrenderエラー() {
        let template = make_template("", "{{ birthday | date(format=\"%m/%d\") }}", "");
        let compiled = TeraTemplateRenderer::new().compile(&template).unwrap();

        let ok = compiled.render(&hashmap! { "birthday".to_string() => "1990-04-01".to_string() });
        let ng = compiled.render(&hashmap! { "birthday".to_string() => "そのうち".to_string() });

        assert_eq!(ok.unwrap().html, "04/01");
        assert!(matches!(ng, Err(TemplateError::Render(_))));
    }
}
