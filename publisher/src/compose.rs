use dealwatch_core::Candidate;

/// Hard ceiling imposed by the posting target.
pub const MAX_POST_LEN: usize = 280;

const TITLE_LIMIT: usize = 90;

/// Collapse runs of whitespace and cap the title length, breaking on a
/// character boundary with a trailing ellipsis.
fn clean_title(title: &str, limit: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(limit.saturating_sub(3)).collect();
    truncated = truncated.trim_end().to_string();
    truncated.push_str("...");
    truncated
}

/// Render the outbound post text for a deal. Always fits within
/// [`MAX_POST_LEN`]; the title is what gives when space runs short.
pub fn compose_deal_post(candidate: &Candidate, niche: bool) -> String {
    let headline = if niche {
        format!("💄 Beauty Deal: {:.0}% OFF", candidate.discount_percent)
    } else {
        format!("🔥 {:.0}% OFF", candidate.discount_percent)
    };

    let link = format!("https://www.amazon.com/dp/{}", candidate.product_id);
    let hashtags = if niche { "#beauty #deals" } else { "#deals" };

    let mut title_limit = TITLE_LIMIT;
    loop {
        let title = clean_title(&candidate.title, title_limit);
        let mut text = format!(
            "{}\n{}\n💰 ${:.2} (was ${:.2}, save ${:.2})",
            headline,
            title,
            candidate.current_price,
            candidate.reference_price,
            candidate.savings()
        );
        if let (Some(rating), Some(reviews)) = (candidate.rating, candidate.review_count) {
            text.push_str(&format!("\n⭐ {:.1} ({} reviews)", rating, reviews));
        }
        text.push_str(&format!("\n{}\n{}", link, hashtags));

        if text.chars().count() <= MAX_POST_LEN || title_limit <= 10 {
            return text;
        }
        title_limit -= 10;
    }
}
