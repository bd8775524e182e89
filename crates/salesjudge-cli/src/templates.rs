pub const GITIGNORE: &str = r#"/artifacts/
/.salesjudge/
"#;

pub const DEMO_TRANSCRIPTS_YAML: &str = r#"conversations:
  - id: demo-001
    source: demo
    messages:
      - speaker: customer
        text: "Hi, I want to renew but my budget is tight this month"
      - speaker: seller
        text: "Hello! I understand your situation, here is the Plus package"
  - id: demo-002
    source: demo
    messages:
      - speaker: customer
        text: "Can I get a discount on my current plan?"
      - speaker: seller
        text: "Sure, I can apply a promo code for you"
      - speaker: customer
        text: "Thanks"
  - id: demo-003
    source: demo
    messages:
      - speaker: customer
        text: "My order arrived broken"
      - speaker: seller
        text: "I'm sorry to hear that, let me check the order"
      - speaker: seller
        text: "A replacement ships tomorrow"
"#;
